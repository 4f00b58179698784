//! Move application and reversal with incremental state updates.

use super::types::{
    Bitboard, Color, Direction, File, Move, MoveKind, Piece, PieceType, Rank, Square,
};
use super::zobrist::{cyclic_index_hi, cyclic_index_lo, CYCLIC, ZOBRIST};
use super::{attack_tables, Board, Boardstack, PIECE_MG_VALUES};

impl Board {
    /// Applies a legal move, computing the gives-check hint on the fly.
    pub fn do_move(&mut self, mv: Move) {
        let gives_check = self.move_gives_check(mv);
        self.do_move_gc(mv, gives_check);
    }

    /// Applies a legal move using a precomputed gives-check hint.
    pub fn do_move_gc(&mut self, mv: Move, gives_check: bool) {
        let mut key = self.stack().board_key ^ ZOBRIST.black_to_move;

        // Clone the updatable fields of the current frame onto the stack.
        let mut next = Boardstack {
            captured_piece: Piece::NONE,
            repetition: 0,
            ..self.stack().clone()
        };
        next.rule50 += 1;
        next.plies_since_nullmove += 1;
        self.stack.push(next);
        self.ply += 1;

        let us = self.side_to_move;
        let them = us.flip();
        let from = mv.from();
        let mut to = mv.to();
        let piece = self.piece_on(from);
        let mut captured = if mv.kind() == MoveKind::EnPassant {
            Piece::new(them, PieceType::Pawn)
        } else {
            self.piece_on(to)
        };

        if mv.kind() == MoveKind::Castling {
            // Encoded as king-takes-rook; relocate both pieces.
            let rook = captured;
            let kingside = to > from;
            let rook_from = to;
            let rook_to = Square::new(
                if kingside { File::F } else { File::D },
                Rank::FIRST,
            )
            .relative(us);
            to = Square::new(
                if kingside { File::G } else { File::C },
                Rank::FIRST,
            )
            .relative(us);

            self.remove_piece(from);
            self.remove_piece(rook_from);
            self.mailbox[from.index()] = Piece::NONE;
            self.mailbox[rook_from.index()] = Piece::NONE;
            self.put_piece(Piece::new(us, PieceType::King), to);
            self.put_piece(rook, rook_to);

            key ^= ZOBRIST.piece(rook, rook_from) ^ ZOBRIST.piece(rook, rook_to);
            captured = Piece::NONE;
        }

        if !captured.is_none() {
            let mut captured_square = to;

            if captured.piece_type() == PieceType::Pawn {
                if mv.kind() == MoveKind::EnPassant {
                    captured_square = to.shift(Direction::pawn_push(them));
                }
                self.stack_mut().king_pawn_key ^= ZOBRIST.piece(captured, captured_square);
            } else {
                self.stack_mut().material[them.index()] -=
                    PIECE_MG_VALUES[captured.piece_type().index()];
            }

            self.remove_piece(captured_square);
            self.mailbox[captured_square.index()] = Piece::NONE;

            key ^= ZOBRIST.piece(captured, captured_square);
            self.stack_mut().material_key ^=
                ZOBRIST.psq[captured.index()][self.piece_count(captured) as usize];
            self.stack_mut().rule50 = 0;
        }

        key ^= ZOBRIST.piece(piece, from) ^ ZOBRIST.piece(piece, to);

        if let Some(ep) = self.stack().ep_square {
            key ^= ZOBRIST.ep_file(ep.file());
            self.stack_mut().ep_square = None;
        }

        // Drop castling rights on king or rook departure (and rook capture).
        let mask = self.castling_mask[from.index()] | self.castling_mask[mv.to().index()];
        if !self.stack().castlings.is_empty() && !mask.is_empty() {
            key ^= ZOBRIST.castling_rights(self.stack().castlings & mask);
            self.stack_mut().castlings &= !mask;
        }

        if mv.kind() != MoveKind::Castling {
            self.move_piece(from, to);
        }

        match piece.piece_type() {
            PieceType::Pawn => {
                let push = Direction::pawn_push(us);

                if (to.0 ^ from.0) == 16
                    && (attack_tables::pawn_attacks(us, to.shift(Direction(-push.0)))
                        & self.pieces_bb(them, PieceType::Pawn))
                    .any()
                {
                    // A double push only sets the en-passant square when an
                    // enemy pawn could actually take.
                    let ep = to.shift(Direction(-push.0));
                    self.stack_mut().ep_square = Some(ep);
                    key ^= ZOBRIST.ep_file(ep.file());
                } else if mv.kind() == MoveKind::Promotion {
                    let new_piece = Piece::new(us, mv.promotion_type());

                    self.remove_piece(to);
                    self.put_piece(new_piece, to);

                    key ^= ZOBRIST.piece(piece, to) ^ ZOBRIST.piece(new_piece, to);
                    self.stack_mut().king_pawn_key ^= ZOBRIST.piece(piece, to);
                    self.stack_mut().material[us.index()] +=
                        PIECE_MG_VALUES[mv.promotion_type().index()];
                    let new_count = self.piece_count(new_piece) as usize - 1;
                    let pawn_count = self.piece_count(piece) as usize;
                    self.stack_mut().material_key ^= ZOBRIST.psq[new_piece.index()][new_count]
                        ^ ZOBRIST.psq[piece.index()][pawn_count];
                }

                let kp = ZOBRIST.piece(piece, from) ^ ZOBRIST.piece(piece, to);
                self.stack_mut().king_pawn_key ^= kp;
                self.stack_mut().rule50 = 0;
            }
            PieceType::King => {
                self.stack_mut().king_pawn_key ^=
                    ZOBRIST.piece(piece, from) ^ ZOBRIST.piece(piece, to);
            }
            _ => {}
        }

        self.stack_mut().captured_piece = captured;
        self.stack_mut().board_key = key;

        self.stack_mut().checkers = if gives_check {
            self.attackers_to(self.king_square(them)) & self.color_bb(us)
        } else {
            Bitboard::EMPTY
        };

        self.side_to_move = them;
        self.set_check_info();
        self.update_repetition();
    }

    /// Sets the signed repetition marker for the freshly-pushed frame.
    fn update_repetition(&mut self) {
        let top = self.stack();
        let span = top.rule50.min(top.plies_since_nullmove) as usize;
        let key = top.board_key;

        let mut repetition = 0i16;
        let mut back = 4;
        while back <= span {
            if let Some(frame) = self.stack_at(back) {
                if frame.board_key == key {
                    repetition = if frame.repetition != 0 {
                        -(back as i16)
                    } else {
                        back as i16
                    };
                    break;
                }
            } else {
                break;
            }
            back += 2;
        }

        self.stack_mut().repetition = repetition;
    }

    /// Reverts the last move. No key recomputation is needed since the
    /// popped frame carries all reversible state.
    pub fn undo_move(&mut self, mv: Move) {
        self.side_to_move = self.side_to_move.flip();

        let us = self.side_to_move;
        let from = mv.from();
        let mut to = mv.to();

        if mv.kind() == MoveKind::Promotion {
            self.remove_piece(to);
            self.put_piece(Piece::new(us, PieceType::Pawn), to);
        }

        if mv.kind() == MoveKind::Castling {
            let kingside = to > from;
            let rook_from = to;
            let rook_to = Square::new(
                if kingside { File::F } else { File::D },
                Rank::FIRST,
            )
            .relative(us);
            to = Square::new(
                if kingside { File::G } else { File::C },
                Rank::FIRST,
            )
            .relative(us);

            self.remove_piece(to);
            self.remove_piece(rook_to);
            self.mailbox[to.index()] = Piece::NONE;
            self.mailbox[rook_to.index()] = Piece::NONE;
            self.put_piece(Piece::new(us, PieceType::King), from);
            self.put_piece(Piece::new(us, PieceType::Rook), rook_from);
        } else {
            self.move_piece(to, from);

            let captured = self.stack().captured_piece;
            if !captured.is_none() {
                let mut captured_square = to;
                if mv.kind() == MoveKind::EnPassant {
                    captured_square = to.shift(Direction::pawn_push(us.flip()));
                }
                self.put_piece(captured, captured_square);
            }
        }

        self.stack.pop();
        self.ply -= 1;
    }

    /// Passes the turn: used by null-move pruning only.
    pub fn do_null_move(&mut self) {
        let mut next = self.stack().clone();

        if let Some(ep) = next.ep_square.take() {
            next.board_key ^= ZOBRIST.ep_file(ep.file());
        }
        next.board_key ^= ZOBRIST.black_to_move;
        next.rule50 += 1;
        next.plies_since_nullmove = 0;
        next.repetition = 0;

        self.stack.push(next);
        self.ply += 1;
        self.side_to_move = self.side_to_move.flip();
        self.set_check_info();
    }

    pub fn undo_null_move(&mut self) {
        self.stack.pop();
        self.ply -= 1;
        self.side_to_move = self.side_to_move.flip();
    }

    /// Draw by 50-move rule or repetition. `ply` is the distance from the
    /// search root; in-tree twofold repetitions only count when the earlier
    /// occurrence is inside the tree as well.
    pub fn game_is_drawn(&self, ply: usize) -> bool {
        let top = self.stack();

        if top.rule50 > 99 {
            if top.checkers.is_empty() {
                return true;
            }
            // A mate on the hundredth ply takes precedence over the draw.
            let mut list = super::Movelist::new();
            super::movegen::generate_legal(&mut list, self);
            if !list.is_empty() {
                return true;
            }
        }

        top.repetition != 0 && (top.repetition as i32) < ply as i32
    }

    /// Detects an upcoming or just-completed move cycle using the table of
    /// reversible-move hash deltas. A hit means the search can often score
    /// the node as a draw without exploring it.
    pub fn game_has_cycle(&self, ply: usize) -> bool {
        let top = self.stack();
        let span = top.rule50.min(top.plies_since_nullmove) as usize;

        if span < 3 {
            return false;
        }

        let original_key = top.board_key;

        let mut distance = 3;
        while distance <= span {
            let Some(frame) = self.stack_at(distance) else {
                break;
            };

            let move_key = original_key ^ frame.board_key;

            // Two-probe cuckoo lookup.
            let mut index = cyclic_index_lo(move_key);
            if CYCLIC.keys[index] != move_key {
                index = cyclic_index_hi(move_key);
                if CYCLIC.keys[index] != move_key {
                    distance += 2;
                    continue;
                }
            }

            let mv = CYCLIC.moves[index];
            let (from, to) = (mv.from(), mv.to());

            if (attack_tables::between_bb(from, to) & self.occupancy_bb()).is_empty() {
                if ply > distance {
                    return true;
                }

                // Cycles reaching behind the root only count when the
                // earlier position already repeated.
                if frame.repetition == 0 {
                    distance += 2;
                    continue;
                }

                let piece_square = if self.square_is_empty(from) { to } else { from };
                if self.piece_on(piece_square).color() != self.side_to_move {
                    return true;
                }
            }

            distance += 2;
        }

        false
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::board::movegen::{generate_legal, Movelist};

    fn keys_of(board: &Board) -> (u64, u64, u64) {
        let top = board.stack();
        (top.board_key, top.king_pawn_key, top.material_key)
    }

    #[test]
    fn test_make_unmake_restores_state() {
        let mut board = Board::startpos();
        let original_fen = board.to_fen();
        let original_keys = keys_of(&board);
        let original_psq = board.psq_scorepair();

        let mut list = Movelist::new();
        generate_legal(&mut list, &board);
        assert_eq!(list.len(), 20);

        for &mv in list.iter() {
            board.do_move(mv);
            board.undo_move(mv);
            assert_eq!(board.to_fen(), original_fen, "fen after {mv:?}");
            assert_eq!(keys_of(&board), original_keys, "keys after {mv:?}");
            assert_eq!(board.psq_scorepair(), original_psq, "psq after {mv:?}");
        }
    }

    #[test]
    fn test_incremental_keys_match_recompute() {
        let mut board = Board::startpos();
        for text in ["e2e4", "c7c5", "g1f3", "d7d6", "f1b5", "c8d7", "e1g1"] {
            let mv = board.uci_to_move(text);
            assert!(!mv.is_none(), "{text} should be legal");
            board.do_move(mv);

            let incremental = keys_of(&board);
            let mut fresh = Board::from_fen(&board.to_fen(), false).unwrap();
            fresh.stack_mut().rule50 = board.stack().rule50;
            assert_eq!(keys_of(&fresh), incremental, "after {text}");
        }
    }

    #[test]
    fn test_en_passant_cycle() {
        let mut board = Board::from_fen(
            "rnbqkbnr/ppp1pppp/8/8/3pP3/8/PPPP1PPP/RNBQKBNR b KQkq e3 0 3",
            false,
        )
        .unwrap();
        let mv = board.uci_to_move("d4e3");
        assert!(!mv.is_none());
        let pawns_before = board.piecetype_count(PieceType::Pawn);
        board.do_move(mv);
        assert_eq!(board.piecetype_count(PieceType::Pawn), pawns_before - 1);
        board.undo_move(mv);
        assert_eq!(board.piecetype_count(PieceType::Pawn), pawns_before);
    }

    #[test]
    fn test_threefold_repetition_detection() {
        let mut board = Board::startpos();
        for text in [
            "g1f3", "g8f6", "f3g1", "f6g8", "g1f3", "g8f6", "f3g1", "f6g8",
        ] {
            let mv = board.uci_to_move(text);
            board.do_move(mv);
        }
        // The final position repeats the start position for the second time.
        assert!(board.stack().repetition < 0);
        assert!(board.game_is_drawn(0));
    }

    #[test]
    fn test_twofold_inside_tree() {
        let mut board = Board::startpos();
        for text in ["g1f3", "g8f6", "f3g1", "f6g8"] {
            let mv = board.uci_to_move(text);
            board.do_move(mv);
        }
        assert_eq!(board.stack().repetition, 4);
        // Drawn only when the first occurrence is inside the search tree.
        assert!(board.game_is_drawn(5));
        assert!(!board.game_is_drawn(3));
    }

    #[test]
    fn test_null_move_roundtrip() {
        let mut board = Board::startpos();
        let keys = keys_of(&board);
        board.do_null_move();
        assert_ne!(board.stack().board_key, keys.0);
        assert_eq!(board.side_to_move(), Color::Black);
        board.undo_null_move();
        assert_eq!(keys_of(&board), keys);
        assert_eq!(board.side_to_move(), Color::White);
    }

    #[test]
    fn test_castling_roundtrip() {
        let fen = "r3k2r/p1ppqpb1/bn2pnp1/3PN3/1p2P3/2N2Q1p/PPPBBPPP/R3K2R w KQkq - 0 1";
        let mut board = Board::from_fen(fen, false).unwrap();
        let mv = board.uci_to_move("e1g1");
        assert_eq!(mv.kind(), MoveKind::Castling);
        assert_eq!(mv.to(), Square::H1); // king-takes-rook encoding
        board.do_move(mv);
        assert_eq!(board.piece_on(Square::G1), Piece::WHITE_KING);
        assert_eq!(board.piece_on(Square::F1), Piece::WHITE_ROOK);
        board.undo_move(mv);
        assert_eq!(board.to_fen(), fen);
    }
}
