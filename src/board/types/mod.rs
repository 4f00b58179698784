//! Primitive chess types: squares, pieces, moves, scores, bitboards.

mod bitboard;
mod castling;
mod moves;
mod piece;
mod score;
mod square;

pub use bitboard::Bitboard;
pub use castling::CastlingRights;
pub use moves::{Move, MoveKind};
pub use piece::{Color, Piece, PieceType};
pub use score::{
    mate_in, mated_in, Score, Scorepair, DRAW, INF_SCORE, MATE, MATE_FOUND, MAX_PLIES, NO_SCORE,
    VICTORY,
};
pub use square::{Direction, File, Rank, Square};
