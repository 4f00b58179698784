//! Move validity predicates: pseudo-legality, full legality, and check
//! detection for not-yet-played moves.

use super::attack_tables::{
    aligned, attacks_bb, between_bb, bishop_attacks, pawn_attacks, rook_attacks,
};
use super::movegen::{self, Movelist};
use super::types::{
    Bitboard, Direction, File, Move, MoveKind, PieceType, Rank, Square,
};
use super::Board;

impl Board {
    /// Fast check that a move (typically from the TT or killer slots) could
    /// have been produced by the generators for this position. Non-normal
    /// moves fall back to full generation.
    pub fn move_is_pseudo_legal(&self, mv: Move) -> bool {
        let us = self.side_to_move;
        let from = mv.from();
        let to = mv.to();
        let piece = self.piece_on(from);

        // Uncommon kinds are validated against the generated list.
        if mv.kind() != MoveKind::Normal {
            let mut list = Movelist::new();
            movegen::generate_pseudo(&mut list, self);
            return list.contains(mv);
        }

        // Normal moves never carry promotion bits.
        if mv.promotion_type() != PieceType::Knight {
            return false;
        }

        // A friendly piece must be on the origin square.
        if piece.is_none() || piece.color() != us {
            return false;
        }

        // The arrival square cannot hold a friendly piece. (Castling is
        // king-takes-rook, but it was already handled above.)
        if self.color_bb(us).contains(to) {
            return false;
        }

        if piece.piece_type() == PieceType::Pawn {
            // Promotions were handled above, so the pawn cannot arrive on a
            // back rank.
            if (Bitboard::RANK_1 | Bitboard::RANK_8).contains(to) {
                return false;
            }

            let push = Direction::pawn_push(us);
            let is_capture =
                pawn_attacks(us, from).contains(to) && self.color_bb(us.flip()).contains(to);
            let is_push = from.shift(push) == to && self.square_is_empty(to);
            let is_double_push = from.0 as i16 + 2 * push.0 as i16 == to.0 as i16
                && from.relative_rank(us) == Rank::SECOND
                && self.square_is_empty(to)
                && self.square_is_empty(to.shift(Direction(-push.0)));

            if !is_capture && !is_push && !is_double_push {
                return false;
            }
        } else if !attacks_bb(piece.piece_type(), from, self.occupancy_bb()).contains(to) {
            return false;
        }

        let checkers = self.stack().checkers;
        if checkers.any() {
            if piece.piece_type() != PieceType::King {
                // Only king moves can answer a double check.
                if checkers.more_than_one() {
                    return false;
                }

                // Otherwise the move must capture or block the checker.
                let checker = checkers.first_square();
                if !(between_bb(checker, self.king_square(us))
                    | Bitboard::from_square(checker))
                .contains(to)
                {
                    return false;
                }
            } else if (self
                .attackers_to_occ(to, self.occupancy_bb() ^ Bitboard::from_square(from))
                & self.color_bb(us.flip()))
            .any()
            {
                return false;
            }
        }

        true
    }

    /// Full legality for a pseudo-legal move: no discovered check on our
    /// own king, no castling through attacked squares.
    pub fn move_is_legal(&self, mv: Move) -> bool {
        let us = self.side_to_move;
        let them = us.flip();
        let from = mv.from();
        let to = mv.to();

        if mv.kind() == MoveKind::EnPassant {
            // Lift both pawns and check for an uncovered slider attack.
            let king_square = self.king_square(us);
            let capture_square = to.shift(Direction::pawn_push(them));
            let occupied = (self.occupancy_bb()
                ^ Bitboard::from_square(from)
                ^ Bitboard::from_square(capture_square))
                | Bitboard::from_square(to);

            return (rook_attacks(king_square, occupied)
                & self.pieces_bb(them, PieceType::Rook))
            .is_empty()
                && (rook_attacks(king_square, occupied)
                    & self.pieces_bb(them, PieceType::Queen))
                .is_empty()
                && (bishop_attacks(king_square, occupied)
                    & (self.pieces_bb(them, PieceType::Bishop)
                        | self.pieces_bb(them, PieceType::Queen)))
                .is_empty();
        }

        if mv.kind() == MoveKind::Castling {
            // Every square on the king's path must be safe.
            let king_to = Square::new(
                if to > from { File::G } else { File::C },
                Rank::FIRST,
            )
            .relative(us);
            let step = if king_to > from { Direction::WEST } else { Direction::EAST };

            let mut sq = king_to;
            while sq != from {
                if (self.attackers_to(sq) & self.color_bb(them)).any() {
                    return false;
                }
                sq = sq.shift(step);
            }

            // In Chess960 the vacated rook square may uncover an x-ray on
            // the king's destination.
            return !self.chess960
                || (rook_attacks(
                    king_to,
                    self.occupancy_bb() ^ Bitboard::from_square(to),
                ) & (self.pieces_bb(them, PieceType::Rook)
                    | self.pieces_bb(them, PieceType::Queen)))
                .is_empty();
        }

        if self.piece_on(from).piece_type() == PieceType::King {
            return (self.attackers_to_occ(to, self.occupancy_bb() ^ Bitboard::from_square(from))
                & self.color_bb(them))
            .is_empty();
        }

        // A pinned piece may only move along the pin line.
        !self.stack().king_blockers[us.index()].contains(from)
            || aligned(from, to, self.king_square(us))
    }

    /// Whether a (pseudo-legal) move checks the opposing king, either
    /// directly, by discovery, or through one of the special move kinds.
    pub fn move_gives_check(&self, mv: Move) -> bool {
        let us = self.side_to_move;
        let them = us.flip();
        let from = mv.from();
        let to = mv.to();
        let their_king = self.king_square(them);

        // Direct check from the precomputed per-piece-type masks.
        let moved_type = self.piece_on(from).piece_type();
        if self.stack().check_squares[moved_type.index()].contains(to) {
            return true;
        }

        // Discovered check: the mover is a blocker leaving the king line.
        if self.stack().king_blockers[them.index()].contains(from)
            && !aligned(from, to, their_king)
        {
            return true;
        }

        match mv.kind() {
            MoveKind::Normal => false,

            // The promoted piece may check from the arrival square once the
            // pawn is lifted.
            MoveKind::Promotion => attacks_bb(
                mv.promotion_type(),
                to,
                self.occupancy_bb() ^ Bitboard::from_square(from),
            )
            .contains(their_king),

            // Removing the captured pawn may uncover a slider.
            MoveKind::EnPassant => {
                let capture_square = Square::new(to.file(), from.rank());
                let occupied = (self.occupancy_bb()
                    ^ Bitboard::from_square(from)
                    ^ Bitboard::from_square(capture_square))
                    | Bitboard::from_square(to);

                ((rook_attacks(their_king, occupied)
                    & self.piecetypes_bb(PieceType::Rook, PieceType::Queen))
                    | (bishop_attacks(their_king, occupied)
                        & self.piecetypes_bb(PieceType::Bishop, PieceType::Queen)))
                    & self.color_bb(us)
            }
            .any(),

            // The castled rook may give check from its final square.
            MoveKind::Castling => {
                let kingside = to > from;
                let rook_to = Square::new(
                    if kingside { File::F } else { File::D },
                    Rank::FIRST,
                )
                .relative(us);
                let king_to = Square::new(
                    if kingside { File::G } else { File::C },
                    Rank::FIRST,
                )
                .relative(us);
                let occupied = (self.occupancy_bb()
                    ^ Bitboard::from_square(from)
                    ^ Bitboard::from_square(to))
                    | Bitboard::from_square(king_to)
                    | Bitboard::from_square(rook_to);

                rook_attacks(rook_to, occupied).contains(their_king)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::board::movegen::generate_legal;

    #[test]
    fn test_generated_moves_are_pseudo_legal_and_legal() {
        let fens = [
            Board::STARTPOS,
            "r3k2r/p1ppqpb1/bn2pnp1/3PN3/1p2P3/2N2Q1p/PPPBBPPP/R3K2R w KQkq - 0 1",
            "8/2p5/3p4/KP5r/1R3p1k/8/4P1P1/8 w - - 0 1",
            "rnbq1k1r/pp1Pbppp/2p5/8/2B5/8/PPP1NnPP/RNBQK2R w KQ - 1 8",
        ];

        for fen in fens {
            let board = Board::from_fen(fen, false).unwrap();
            let mut list = Movelist::new();
            generate_legal(&mut list, &board);
            for &mv in list.iter() {
                assert!(board.move_is_pseudo_legal(mv), "{fen} {mv:?}");
                assert!(board.move_is_legal(mv), "{fen} {mv:?}");
            }
        }
    }

    #[test]
    fn test_random_u16_moves_match_generator() {
        let board = Board::from_fen(
            "r3k2r/p1ppqpb1/bn2pnp1/3PN3/1p2P3/2N2Q1p/PPPBBPPP/R3K2R w KQkq - 0 1",
            false,
        )
        .unwrap();
        let mut list = Movelist::new();
        movegen::generate_pseudo(&mut list, &board);

        // Every u16 accepted as pseudo-legal must appear in the generated
        // list exactly once.
        for raw in 0..=u16::MAX {
            let mv = Move(raw);
            if board.move_is_pseudo_legal(mv) {
                let count = list.iter().filter(|&&m| m == mv).count();
                assert_eq!(count, 1, "{mv:?} pseudo-legal but generated {count} times");
            }
        }
    }

    #[test]
    fn test_pinned_piece_moves() {
        // The e4 knight is pinned by the h4 rook... actually by a bishop.
        let board =
            Board::from_fen("4k3/8/8/7b/4N3/8/2K5/8 w - - 0 1", false).unwrap();
        let pinned = board.stack().king_blockers[0];
        assert!(pinned.contains(Square(28)));
        // Any knight move off the pin line is illegal.
        let mv = Move::new(Square(28), Square(45));
        assert!(board.move_is_pseudo_legal(mv));
        assert!(!board.move_is_legal(mv));
    }

    #[test]
    fn test_gives_check_direct_and_discovered() {
        // Rg1-g8 is mate (direct check).
        let board = Board::from_fen("6k1/8/6K1/8/8/8/8/6R1 w - - 0 1", false).unwrap();
        assert!(board.move_gives_check(Move::new(Square::G1, Square(62))));
        assert!(!board.move_gives_check(Move::new(Square::G1, Square(14))));

        // Moving the d5 bishop discovers the d-file rook's check.
        let board = Board::from_fen("3k4/8/8/3B4/8/8/8/3RK3 w - - 0 1", false).unwrap();
        assert!(board.move_gives_check(Move::new(Square(35), Square(44))));
    }
}
