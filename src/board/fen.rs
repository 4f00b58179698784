//! FEN parsing, validation and rendering, plus UCI move text conversion.

use std::fmt;

use super::attack_tables;
use super::types::{
    Bitboard, Color, File, Move, MoveKind, Piece, PieceType, Rank, Square,
};
use super::Board;

/// Reasons a FEN string can be rejected. The engine falls back to the
/// previous position at the UCI boundary when any of these fire.
#[derive(Clone, Copy, PartialEq, Eq, Debug)]
pub enum FenError {
    MissingField,
    BadPieceSection,
    BadSideToMove,
    BadCastling,
    BadEnPassant,
    BadCounter,
    KingCount,
    KingsTouching,
    PawnOnBackRank,
    ImpossibleMaterial,
    SideNotToMoveInCheck,
    TooManyCheckers,
}

impl fmt::Display for FenError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let message = match self {
            FenError::MissingField => "missing field",
            FenError::BadPieceSection => "malformed piece section",
            FenError::BadSideToMove => "invalid side to move",
            FenError::BadCastling => "invalid castling field",
            FenError::BadEnPassant => "invalid en-passant field",
            FenError::BadCounter => "invalid move counter",
            FenError::KingCount => "each side must have exactly one king",
            FenError::KingsTouching => "kings are adjacent",
            FenError::PawnOnBackRank => "pawn on first or last rank",
            FenError::ImpossibleMaterial => "impossible material distribution",
            FenError::SideNotToMoveInCheck => "side not to move is in check",
            FenError::TooManyCheckers => "more than two checkers",
        };
        write!(f, "{message}")
    }
}

impl std::error::Error for FenError {}

/// Piece counts that cannot arise from a legal game, accounting for the
/// pawns consumed by promotions.
fn invalid_material(board: &Board, color: Color) -> bool {
    let count = |pt| board.piece_count(Piece::new(color, pt)) as i32;
    let pawns = count(PieceType::Pawn);
    let knights = count(PieceType::Knight);
    let bishops = count(PieceType::Bishop);
    let rooks = count(PieceType::Rook);
    let queens = count(PieceType::Queen);

    let pknights = (knights - 2).max(0);
    let pbishops = (bishops - 2).max(0);
    let prooks = (rooks - 2).max(0);
    let pqueens = (queens - 1).max(0);
    let promoted = pknights + pbishops + prooks + pqueens;

    let pawns = pawns + promoted;

    pawns > 8
        || knights + pawns - pknights > 10
        || bishops + pawns - pbishops > 10
        || rooks + pawns - prooks > 10
        || queens + pawns - pqueens > 9
}

impl Board {
    /// Parses a 4-to-6 field FEN string, validating it thoroughly enough
    /// that the move generator cannot be driven out of its invariants.
    pub fn from_fen(fen: &str, chess960: bool) -> Result<Board, FenError> {
        let mut fields = fen.split_whitespace();
        let pieces = fields.next().ok_or(FenError::MissingField)?;
        let stm = fields.next().ok_or(FenError::MissingField)?;
        let castlings = fields.next().ok_or(FenError::MissingField)?;
        let en_passant = fields.next().ok_or(FenError::MissingField)?;
        let rule50 = fields.next();
        let fullmove = fields.next();

        let mut board = Board::empty();
        board.chess960 = chess960;

        // Piece section, rank 8 downwards.
        let mut file = 0u8;
        let mut rank = 7i8;
        for c in pieces.chars() {
            match c {
                '1'..='8' => {
                    file += c as u8 - b'0';
                    if file > 8 {
                        return Err(FenError::BadPieceSection);
                    }
                }
                '/' => {
                    if file != 8 || rank == 0 {
                        return Err(FenError::BadPieceSection);
                    }
                    file = 0;
                    rank -= 1;
                }
                _ => {
                    let piece = Piece::from_char(c).ok_or(FenError::BadPieceSection)?;
                    if file >= 8 {
                        return Err(FenError::BadPieceSection);
                    }
                    board.put_piece(piece, Square::new(File(file), Rank(rank as u8)));
                    file += 1;
                }
            }
        }
        if rank != 0 || file != 8 {
            return Err(FenError::BadPieceSection);
        }

        if board.piece_count(Piece::WHITE_KING) != 1 || board.piece_count(Piece::BLACK_KING) != 1 {
            return Err(FenError::KingCount);
        }
        if board
            .king_square(Color::White)
            .distance(board.king_square(Color::Black))
            == 1
        {
            return Err(FenError::KingsTouching);
        }
        if (board.piecetype_bb(PieceType::Pawn) & (Bitboard::RANK_1 | Bitboard::RANK_8)).any() {
            return Err(FenError::PawnOnBackRank);
        }
        if invalid_material(&board, Color::White) || invalid_material(&board, Color::Black) {
            return Err(FenError::ImpossibleMaterial);
        }

        board.side_to_move = match stm {
            "w" => Color::White,
            "b" => Color::Black,
            _ => return Err(FenError::BadSideToMove),
        };

        // Castling section: KQkq, Shredder-style file letters, or "-".
        if castlings != "-" {
            for c in castlings.chars() {
                let color = if c.is_ascii_lowercase() {
                    Color::Black
                } else {
                    Color::White
                };
                let rook = Piece::new(color, PieceType::Rook);
                let back_rank = Rank::FIRST.relative(color);

                let rook_square = match c.to_ascii_uppercase() {
                    'K' => (0..8)
                        .rev()
                        .map(|f| Square::new(File(f), back_rank))
                        .find(|&sq| board.piece_on(sq) == rook),
                    'Q' => (0..8)
                        .map(|f| Square::new(File(f), back_rank))
                        .find(|&sq| board.piece_on(sq) == rook),
                    'A'..='H' => {
                        let sq = Square::new(File(c.to_ascii_uppercase() as u8 - b'A'), back_rank);
                        (board.piece_on(sq) == rook).then_some(sq)
                    }
                    _ => return Err(FenError::BadCastling),
                };

                match rook_square {
                    Some(sq) => board.set_castling(color, sq),
                    None => return Err(FenError::BadCastling),
                }
            }
        }

        // En-passant section; unusable squares are normalized to none.
        if en_passant != "-" {
            let square: Square = en_passant.parse().map_err(|()| FenError::BadEnPassant)?;
            if square.rank() != Rank::THIRD && square.rank() != Rank::SIXTH {
                return Err(FenError::BadEnPassant);
            }

            let us = board.side_to_move;
            let them = us.flip();
            let capturers = attack_tables::pawn_attacks(them, square)
                & board.pieces_bb(us, PieceType::Pawn);
            let captured = square
                .try_shift(super::types::Direction::pawn_push(them))
                .map(Bitboard::from_square)
                .unwrap_or(Bitboard::EMPTY)
                & board.pieces_bb(them, PieceType::Pawn);

            if capturers.any() && captured.any() {
                board.stack_mut().ep_square = Some(square);
            }
        }

        board.stack_mut().rule50 = match rule50 {
            None => 0,
            Some(s) => s.parse::<u16>().map_err(|_| FenError::BadCounter)?,
        };
        if board.stack().rule50 > 150 {
            return Err(FenError::BadCounter);
        }

        let fullmove = match fullmove {
            None => 1,
            Some(s) => s.parse::<i32>().map_err(|_| FenError::BadCounter)?,
        };
        board.ply = (2 * (fullmove - 1)).max(0) as u16;
        if board.side_to_move == Color::Black {
            board.ply += 1;
        }

        board.set_boardstack();

        // The king of the side that just moved must not be capturable, and
        // no position can have more than two simultaneous checkers.
        let them = board.side_to_move.flip();
        if (board.attackers_to(board.king_square(them)) & board.color_bb(board.side_to_move)).any()
        {
            return Err(FenError::SideNotToMoveInCheck);
        }
        if board.stack().checkers.count() > 2 {
            return Err(FenError::TooManyCheckers);
        }

        Ok(board)
    }

    /// Renders the position as a 6-field FEN string.
    pub fn to_fen(&self) -> String {
        let mut fen = String::new();

        for rank in (0..8).rev() {
            let mut empty = 0;
            for file in 0..8 {
                let piece = self.piece_on(Square::new(File(file), Rank(rank)));
                if piece.is_none() {
                    empty += 1;
                } else {
                    if empty > 0 {
                        fen.push((b'0' + empty) as char);
                        empty = 0;
                    }
                    fen.push(piece.to_char());
                }
            }
            if empty > 0 {
                fen.push((b'0' + empty) as char);
            }
            if rank > 0 {
                fen.push('/');
            }
        }

        fen.push(' ');
        fen.push(if self.side_to_move == Color::White { 'w' } else { 'b' });
        fen.push(' ');

        let castlings = self.stack().castlings;
        if castlings.is_empty() {
            fen.push('-');
        } else {
            use super::types::CastlingRights;
            for (rights, standard) in [
                (CastlingRights::WHITE_OO, 'K'),
                (CastlingRights::WHITE_OOO, 'Q'),
                (CastlingRights::BLACK_OO, 'k'),
                (CastlingRights::BLACK_OOO, 'q'),
            ] {
                if castlings.has(rights) {
                    if self.chess960 {
                        let rook = self.castling_rook_square[rights.single_index()];
                        let letter = (b'a' + rook.file().0) as char;
                        fen.push(if standard.is_ascii_uppercase() {
                            letter.to_ascii_uppercase()
                        } else {
                            letter
                        });
                    } else {
                        fen.push(standard);
                    }
                }
            }
        }

        fen.push(' ');
        match self.stack().ep_square {
            Some(sq) => fen.push_str(&sq.to_string()),
            None => fen.push('-'),
        }

        fen.push_str(&format!(
            " {} {}",
            self.stack().rule50,
            1 + self.ply / 2
        ));
        fen
    }

    /// Renders a move in UCI text. Standard-chess castling is shown with
    /// the king's actual destination; Chess960 keeps king-takes-rook.
    pub fn move_to_uci(&self, mv: Move) -> String {
        if mv.is_none() {
            return "none".to_string();
        }
        if mv == Move::NULL {
            return "0000".to_string();
        }

        let from = mv.from();
        let mut to = mv.to();

        if mv.kind() == MoveKind::Castling && !self.chess960 {
            to = Square::new(
                if to > from { File::G } else { File::C },
                from.rank(),
            );
        }

        let mut text = format!("{from}{to}");
        if mv.kind() == MoveKind::Promotion {
            text.push(mv.promotion_type().to_char());
        }
        text
    }

    /// Matches a UCI move string against the legal moves of the position,
    /// returning `Move::NONE` when nothing matches.
    pub fn uci_to_move(&self, text: &str) -> Move {
        let normalized = text.to_ascii_lowercase();
        let mut list = Movelist::new();
        super::movegen::generate_legal(&mut list, self);

        list.iter()
            .copied()
            .find(|&mv| self.move_to_uci(mv) == normalized)
            .unwrap_or(Move::NONE)
    }
}

use super::movegen::Movelist;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_startpos_roundtrip() {
        let board = Board::startpos();
        assert_eq!(board.to_fen(), Board::STARTPOS);
    }

    #[test]
    fn test_kiwipete_roundtrip() {
        let fen = "r3k2r/p1ppqpb1/bn2pnp1/3PN3/1p2P3/2N2Q1p/PPPBBPPP/R3K2R w KQkq - 0 1";
        let board = Board::from_fen(fen, false).unwrap();
        assert_eq!(board.to_fen(), fen);
    }

    #[test]
    fn test_rejects_bad_fens() {
        assert_eq!(
            Board::from_fen("8/8/8/8/8/8/8/8 w - - 0 1", false),
            Err(FenError::KingCount)
        );
        assert_eq!(
            Board::from_fen("k7/8/8/8/8/8/8/K6P w - - 0 1", false),
            Err(FenError::PawnOnBackRank)
        );
        assert_eq!(
            Board::from_fen("kK6/8/8/8/8/8/8/8 w - - 0 1", false),
            Err(FenError::KingsTouching)
        );
        assert_eq!(
            Board::from_fen("rnbqkbnr/pppppppp/8/8/8/8/PPPPPPPP/RNBQKBNR x KQkq - 0 1", false),
            Err(FenError::BadSideToMove)
        );
        assert!(Board::from_fen("rnbqkbnr/pppppppp/8/8", false).is_err());
    }

    #[test]
    fn test_unusable_ep_square_is_cleared() {
        // EP square given, but no white pawn can capture onto it.
        let board =
            Board::from_fen("rnbqkbnr/ppp1pppp/8/3p4/8/8/PPPPPPPP/RNBQKBNR w KQkq d6 0 2", false)
                .unwrap();
        assert_eq!(board.stack().ep_square, None);
    }

    #[test]
    fn test_usable_ep_square_is_kept() {
        let board = Board::from_fen(
            "rnbqkbnr/ppp1pppp/8/8/3pP3/8/PPPP1PPP/RNBQKBNR b KQkq e3 0 3",
            false,
        )
        .unwrap();
        assert_eq!(board.stack().ep_square, Some(Square(20)));
    }

    #[test]
    fn test_uci_move_conversion() {
        let board = Board::startpos();
        let mv = board.uci_to_move("g1f3");
        assert!(!mv.is_none());
        assert_eq!(board.move_to_uci(mv), "g1f3");
        assert!(board.uci_to_move("e2e5").is_none());
    }
}
