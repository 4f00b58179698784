//! Board representation: mailbox + bitboards with incremental state.
//!
//! The board keeps a growable stack of per-ply state frames holding
//! everything that can't be recomputed cheaply on unmake: hash keys, check
//! info, castling rights, the rule-50 clock and the repetition marker.

pub mod attack_tables;
pub mod fen;
pub mod legality;
pub mod make_unmake;
pub mod movegen;
pub mod see;
pub mod types;
pub mod zobrist;

pub use fen::FenError;
pub use movegen::Movelist;

use attack_tables::{
    attacks_bb, bishop_attacks, king_attacks, knight_attacks, pawn_attacks, rook_attacks,
};
use types::{
    Bitboard, CastlingRights, Color, Move, Piece, PieceType, Rank, Score, Scorepair, Square,
};
use zobrist::ZOBRIST;

use crate::eval::psqt::psq_score;

/// Midgame piece values, used for the material tally that gates null-move
/// pruning and for material-key endgame lookups.
pub const PIECE_MG_VALUES: [Score; 8] = [0, 117, 419, 444, 594, 1194, 0, 0];
/// Endgame piece values, used for qsearch futility margins.
pub const PIECE_EG_VALUES: [Score; 8] = [0, 218, 664, 726, 1188, 2233, 0, 0];

/// Per-ply reversible state. Frame `i` describes the position after the
/// `i`-th move from the root of the current game history.
#[derive(Clone, Debug, PartialEq)]
pub struct Boardstack {
    pub board_key: u64,
    pub king_pawn_key: u64,
    pub material_key: u64,
    pub checkers: Bitboard,
    pub king_blockers: [Bitboard; 2],
    pub pinners: [Bitboard; 2],
    pub check_squares: [Bitboard; 8],
    pub castlings: CastlingRights,
    pub rule50: u16,
    pub plies_since_nullmove: u16,
    /// 0 when this position repeats nothing earlier; otherwise the signed
    /// ply distance to the repeated occurrence, negative when that
    /// occurrence was itself a repetition (threefold against history).
    pub repetition: i16,
    pub ep_square: Option<Square>,
    pub captured_piece: Piece,
    /// Non-pawn, non-king midgame material per side.
    pub material: [Score; 2],
}

impl Default for Boardstack {
    fn default() -> Self {
        Boardstack {
            board_key: 0,
            king_pawn_key: 0,
            material_key: 0,
            checkers: Bitboard::EMPTY,
            king_blockers: [Bitboard::EMPTY; 2],
            pinners: [Bitboard::EMPTY; 2],
            check_squares: [Bitboard::EMPTY; 8],
            castlings: CastlingRights::NONE,
            rule50: 0,
            plies_since_nullmove: 0,
            repetition: 0,
            ep_square: None,
            captured_piece: Piece::NONE,
            material: [0; 2],
        }
    }
}

#[derive(Clone, Debug, PartialEq)]
pub struct Board {
    pub(crate) mailbox: [Piece; 64],
    pub(crate) piecetype_bb: [Bitboard; 8],
    pub(crate) color_bb: [Bitboard; 2],
    pub(crate) piece_count: [u8; 16],
    pub(crate) castling_mask: [CastlingRights; 64],
    pub(crate) castling_rook_square: [Square; 4],
    pub(crate) castling_path: [Bitboard; 4],
    pub(crate) stack: Vec<Boardstack>,
    pub(crate) ply: u16,
    pub(crate) side_to_move: Color,
    pub(crate) psq_scorepair: Scorepair,
    pub(crate) chess960: bool,
}

impl Board {
    /// The standard starting position.
    pub const STARTPOS: &'static str =
        "rnbqkbnr/pppppppp/8/8/8/8/PPPPPPPP/RNBQKBNR w KQkq - 0 1";

    pub fn startpos() -> Board {
        Board::from_fen(Board::STARTPOS, false).expect("startpos FEN is valid")
    }

    fn empty() -> Board {
        Board {
            mailbox: [Piece::NONE; 64],
            piecetype_bb: [Bitboard::EMPTY; 8],
            color_bb: [Bitboard::EMPTY; 2],
            piece_count: [0; 16],
            castling_mask: [CastlingRights::NONE; 64],
            castling_rook_square: [Square::A1; 4],
            castling_path: [Bitboard::EMPTY; 4],
            stack: vec![Boardstack::default()],
            ply: 0,
            side_to_move: Color::White,
            psq_scorepair: Scorepair::ZERO,
            chess960: false,
        }
    }

    // --- Accessors ---

    #[inline]
    pub fn stack(&self) -> &Boardstack {
        self.stack.last().expect("stack is never empty")
    }

    #[inline]
    pub(crate) fn stack_mut(&mut self) -> &mut Boardstack {
        self.stack.last_mut().expect("stack is never empty")
    }

    /// The frame `plies_back` positions before the current one, if the game
    /// history reaches that far.
    #[inline]
    pub(crate) fn stack_at(&self, plies_back: usize) -> Option<&Boardstack> {
        self.stack.len().checked_sub(plies_back + 1).map(|i| &self.stack[i])
    }

    #[inline]
    pub fn side_to_move(&self) -> Color {
        self.side_to_move
    }

    #[inline]
    pub fn ply(&self) -> u16 {
        self.ply
    }

    #[inline]
    pub fn is_chess960(&self) -> bool {
        self.chess960
    }

    #[inline]
    pub fn psq_scorepair(&self) -> Scorepair {
        self.psq_scorepair
    }

    #[inline]
    pub fn piece_on(&self, square: Square) -> Piece {
        self.mailbox[square.index()]
    }

    #[inline]
    pub fn square_is_empty(&self, square: Square) -> bool {
        self.piece_on(square).is_none()
    }

    #[inline]
    pub fn moved_piece(&self, mv: Move) -> Piece {
        self.piece_on(mv.from())
    }

    #[inline]
    pub fn color_bb(&self, color: Color) -> Bitboard {
        self.color_bb[color.index()]
    }

    #[inline]
    pub fn piecetype_bb(&self, piece_type: PieceType) -> Bitboard {
        self.piecetype_bb[piece_type.index()]
    }

    #[inline]
    pub fn piecetypes_bb(&self, pt1: PieceType, pt2: PieceType) -> Bitboard {
        self.piecetype_bb(pt1) | self.piecetype_bb(pt2)
    }

    #[inline]
    pub fn pieces_bb(&self, color: Color, piece_type: PieceType) -> Bitboard {
        self.color_bb(color) & self.piecetype_bb(piece_type)
    }

    #[inline]
    pub fn occupancy_bb(&self) -> Bitboard {
        self.piecetype_bb[0]
    }

    #[inline]
    pub fn piece_count(&self, piece: Piece) -> u8 {
        self.piece_count[piece.index()]
    }

    #[inline]
    pub fn piecetype_count(&self, piece_type: PieceType) -> u8 {
        self.piece_count(Piece::new(Color::White, piece_type))
            + self.piece_count(Piece::new(Color::Black, piece_type))
    }

    #[inline]
    pub fn king_square(&self, color: Color) -> Square {
        self.pieces_bb(color, PieceType::King).first_square()
    }

    /// Material count with the standard values P=1, N=B=3, R=5, Q=9.
    pub fn material_count(&self) -> u32 {
        9 * self.piecetype_count(PieceType::Queen) as u32
            + 5 * self.piecetype_count(PieceType::Rook) as u32
            + 3 * self.piecetype_count(PieceType::Bishop) as u32
            + 3 * self.piecetype_count(PieceType::Knight) as u32
            + self.piecetype_count(PieceType::Pawn) as u32
    }

    /// Zobrist key of the pawn structure alone (king contributions removed).
    pub fn pawn_key(&self) -> u64 {
        self.stack().king_pawn_key
            ^ ZOBRIST.piece(Piece::WHITE_KING, self.king_square(Color::White))
            ^ ZOBRIST.piece(Piece::BLACK_KING, self.king_square(Color::Black))
    }

    #[inline]
    pub fn in_check(&self) -> bool {
        self.stack().checkers.any()
    }

    /// Whether a move captures material or promotes. Castling is encoded as
    /// king-takes-rook, so it must be excluded explicitly.
    #[inline]
    pub fn move_is_noisy(&self, mv: Move) -> bool {
        match mv.kind() {
            types::MoveKind::Normal => !self.square_is_empty(mv.to()),
            types::MoveKind::Castling => false,
            _ => true,
        }
    }

    #[inline]
    pub fn castling_is_blocked(&self, castling: CastlingRights) -> bool {
        (self.occupancy_bb() & self.castling_path[castling.single_index()]).any()
    }

    // --- Attack queries ---

    /// All pieces of both colors attacking `square` on the current
    /// occupancy.
    pub fn attackers_to(&self, square: Square) -> Bitboard {
        self.attackers_to_occ(square, self.occupancy_bb())
    }

    /// All pieces of both colors attacking `square`, with a caller-chosen
    /// occupancy (used by SEE and legality checks that lift pieces).
    pub fn attackers_to_occ(&self, square: Square, occupied: Bitboard) -> Bitboard {
        (pawn_attacks(Color::Black, square) & self.pieces_bb(Color::White, PieceType::Pawn))
            | (pawn_attacks(Color::White, square) & self.pieces_bb(Color::Black, PieceType::Pawn))
            | (knight_attacks(square) & self.piecetype_bb(PieceType::Knight))
            | (king_attacks(square) & self.piecetype_bb(PieceType::King))
            | (bishop_attacks(square, occupied)
                & self.piecetypes_bb(PieceType::Bishop, PieceType::Queen))
            | (rook_attacks(square, occupied)
                & self.piecetypes_bb(PieceType::Rook, PieceType::Queen))
    }

    /// Sliders of `sliders` whose attack on `square` is blocked by exactly
    /// one piece; those single blockers are returned, and blockers of the
    /// same color as the piece on `square` mark their sniper as a pinner.
    fn slider_blockers(
        &self,
        sliders: Bitboard,
        square: Square,
        pinners: &mut Bitboard,
    ) -> Bitboard {
        let mut blockers = Bitboard::EMPTY;
        *pinners = Bitboard::EMPTY;

        let snipers = ((rook_attacks(square, Bitboard::EMPTY)
            & self.piecetypes_bb(PieceType::Rook, PieceType::Queen))
            | (bishop_attacks(square, Bitboard::EMPTY)
                & self.piecetypes_bb(PieceType::Bishop, PieceType::Queen)))
            & sliders;
        let occupied = self.occupancy_bb() ^ snipers;

        for sniper in snipers {
            let between = attack_tables::between_bb(square, sniper) & occupied;

            if between.any() && !between.more_than_one() {
                blockers |= between;
                if (between & self.color_bb(self.piece_on(square).color())).any() {
                    *pinners |= Bitboard::from_square(sniper);
                }
            }
        }

        blockers
    }

    // --- Incremental piece placement ---

    pub(crate) fn put_piece(&mut self, piece: Piece, square: Square) {
        let bb = Bitboard::from_square(square);
        self.mailbox[square.index()] = piece;
        self.piecetype_bb[0] |= bb;
        self.piecetype_bb[piece.piece_type().index()] |= bb;
        self.color_bb[piece.color().index()] |= bb;
        self.piece_count[piece.index()] += 1;
        self.psq_scorepair += psq_score(piece, square);
    }

    pub(crate) fn remove_piece(&mut self, square: Square) {
        let piece = self.piece_on(square);
        let bb = Bitboard::from_square(square);
        self.piecetype_bb[0] ^= bb;
        self.piecetype_bb[piece.piece_type().index()] ^= bb;
        self.color_bb[piece.color().index()] ^= bb;
        self.piece_count[piece.index()] -= 1;
        self.psq_scorepair -= psq_score(piece, square);
        // The mailbox slot is left to the caller, since en-passant and
        // castling need to clear a different square than they fill.
    }

    pub(crate) fn move_piece(&mut self, from: Square, to: Square) {
        let piece = self.piece_on(from);
        let bb = Bitboard::from_square(from) | Bitboard::from_square(to);
        self.piecetype_bb[0] ^= bb;
        self.piecetype_bb[piece.piece_type().index()] ^= bb;
        self.color_bb[piece.color().index()] ^= bb;
        self.mailbox[from.index()] = Piece::NONE;
        self.mailbox[to.index()] = piece;
        self.psq_scorepair += psq_score(piece, to) - psq_score(piece, from);
    }

    // --- Stack derivation ---

    /// Registers a castling right for `color` with its rook on
    /// `rook_square`, deriving the mask, path and rook start square.
    pub(crate) fn set_castling(&mut self, color: Color, rook_square: Square) {
        let king_square = self.king_square(color);
        let kingside = king_square < rook_square;
        let castling = if kingside {
            CastlingRights::kingside(color)
        } else {
            CastlingRights::queenside(color)
        };

        self.stack_mut().castlings |= castling;
        self.castling_mask[king_square.index()] |= castling;
        self.castling_mask[rook_square.index()] |= castling;
        self.castling_rook_square[castling.single_index()] = rook_square;

        let king_after = Square::new(
            if kingside { types::File::G } else { types::File::C },
            Rank::FIRST,
        )
        .relative(color);
        let rook_after = Square::new(
            if kingside { types::File::F } else { types::File::D },
            Rank::FIRST,
        )
        .relative(color);

        self.castling_path[castling.single_index()] =
            (attack_tables::between_bb(rook_square, rook_after)
                | attack_tables::between_bb(king_square, king_after)
                | Bitboard::from_square(rook_after)
                | Bitboard::from_square(king_after))
                - (Bitboard::from_square(king_square) | Bitboard::from_square(rook_square));
    }

    /// Recomputes every key and check-info field of the top frame from the
    /// piece placement. Used after FEN parsing; incremental updates keep
    /// the fields current afterwards.
    pub(crate) fn set_boardstack(&mut self) {
        let us = self.side_to_move;
        let them = us.flip();

        let mut board_key = 0u64;
        let mut king_pawn_key = 0u64;
        let mut material_key = 0u64;
        let mut material = [0 as Score; 2];

        for square in self.occupancy_bb() {
            let piece = self.piece_on(square);
            board_key ^= ZOBRIST.piece(piece, square);

            match piece.piece_type() {
                PieceType::Pawn | PieceType::King => {
                    king_pawn_key ^= ZOBRIST.piece(piece, square);
                }
                piece_type => {
                    material[piece.color().index()] += PIECE_MG_VALUES[piece_type.index()];
                }
            }
        }

        for piece_index in 1..15 {
            let piece = Piece(piece_index);
            if piece.piece_type() == PieceType::None {
                continue;
            }
            for i in 0..self.piece_count(piece) {
                material_key ^= ZOBRIST.psq[piece.index()][i as usize];
            }
        }

        if let Some(ep) = self.stack().ep_square {
            board_key ^= ZOBRIST.ep_file(ep.file());
        }
        if us == Color::Black {
            board_key ^= ZOBRIST.black_to_move;
        }
        board_key ^= ZOBRIST.castling_rights(self.stack().castlings);

        let checkers = self.attackers_to(self.king_square(us)) & self.color_bb(them);

        let top = self.stack_mut();
        top.board_key = board_key;
        top.king_pawn_key = king_pawn_key;
        top.material_key = material_key;
        top.material = material;
        top.checkers = checkers;

        self.set_check_info();
    }

    /// Refreshes pins, king blockers and the per-piece-type checking
    /// squares against the side not to move.
    pub(crate) fn set_check_info(&mut self) {
        let mut white_pinners = Bitboard::EMPTY;
        let mut black_pinners = Bitboard::EMPTY;
        let white_blockers = self.slider_blockers(
            self.color_bb(Color::Black),
            self.king_square(Color::White),
            &mut black_pinners,
        );
        let black_blockers = self.slider_blockers(
            self.color_bb(Color::White),
            self.king_square(Color::Black),
            &mut white_pinners,
        );

        let them = self.side_to_move.flip();
        let their_king = self.king_square(them);
        let occupied = self.occupancy_bb();

        let mut check_squares = [Bitboard::EMPTY; 8];
        check_squares[PieceType::Pawn.index()] = pawn_attacks(them, their_king);
        check_squares[PieceType::Knight.index()] = knight_attacks(their_king);
        check_squares[PieceType::Bishop.index()] = bishop_attacks(their_king, occupied);
        check_squares[PieceType::Rook.index()] = rook_attacks(their_king, occupied);
        check_squares[PieceType::Queen.index()] = check_squares[PieceType::Bishop.index()]
            | check_squares[PieceType::Rook.index()];

        let top = self.stack_mut();
        top.king_blockers = [white_blockers, black_blockers];
        top.pinners = [white_pinners, black_pinners];
        top.check_squares = check_squares;
    }

    /// Non-pawn attack set helper mirroring `attack_tables::attacks_bb`.
    #[inline]
    pub fn piece_attacks(&self, piece_type: PieceType, square: Square) -> Bitboard {
        attacks_bb(piece_type, square, self.occupancy_bb())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_startpos_setup() {
        let board = Board::startpos();
        assert_eq!(board.side_to_move(), Color::White);
        assert_eq!(board.occupancy_bb().count(), 32);
        assert_eq!(board.piece_count(Piece::WHITE_PAWN), 8);
        assert_eq!(board.king_square(Color::White), Square::E1);
        assert_eq!(board.king_square(Color::Black), Square::E8);
        assert_eq!(board.stack().castlings, CastlingRights::ALL);
        assert!(!board.in_check());
        assert_eq!(board.material_count(), 2 * (9 + 10 + 6 + 6 + 8));
    }

    #[test]
    fn test_startpos_psq_is_balanced() {
        let board = Board::startpos();
        assert_eq!(board.psq_scorepair(), Scorepair::ZERO);
    }

    #[test]
    fn test_attackers_to() {
        let board = Board::startpos();
        // e3 is guarded by the d2/f2 pawns, the g1 knight and nothing else.
        let attackers = board.attackers_to(Square(20));
        assert_eq!(attackers.count(), 3);
    }

    #[test]
    fn test_checkers_from_fen() {
        let board =
            Board::from_fen("rnb1kbnr/pppp1ppp/8/4p3/6Pq/5P2/PPPPP2P/RNBQKBNR w KQkq - 1 3", false)
                .unwrap();
        assert!(board.in_check());
        assert_eq!(board.stack().checkers.count(), 1);
        assert_eq!(board.stack().checkers.first_square(), Square(31)); // h4
    }
}
