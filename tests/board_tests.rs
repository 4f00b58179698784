//! Board invariants: make/unmake bit-exactness and hash coherency over
//! randomized legal move sequences.

use cinder::board::movegen::{generate_legal, generate_pseudo, Movelist};
use cinder::board::types::Scorepair;
use cinder::board::Board;

use proptest::prelude::*;

const FEN_CORPUS: [&str; 6] = [
    Board::STARTPOS,
    "r3k2r/p1ppqpb1/bn2pnp1/3PN3/1p2P3/2N2Q1p/PPPBBPPP/R3K2R w KQkq - 0 1",
    "8/2p5/3p4/KP5r/1R3p1k/8/4P1P1/8 w - - 0 1",
    "r3k2r/Pppp1ppp/1b3nbN/nP6/BBP1P3/q4N2/Pp1P2PP/R2Q1RK1 w kq - 0 1",
    "rnbq1k1r/pp1Pbppp/2p5/8/2B5/8/PPP1NnPP/RNBQK2R w KQ - 1 8",
    "r4rk1/1pp1qppp/p1np1n2/2b1p1B1/2B1P1b1/P1NP1N2/1PP1QPPP/R4RK1 w - - 0 10",
];

#[derive(Clone, Copy, Debug, PartialEq)]
struct Snapshot {
    board_key: u64,
    king_pawn_key: u64,
    material_key: u64,
    psq: Scorepair,
    fen_hash: u64,
}

fn snapshot(board: &Board) -> Snapshot {
    use std::collections::hash_map::DefaultHasher;
    use std::hash::{Hash, Hasher};

    let mut hasher = DefaultHasher::new();
    board.to_fen().hash(&mut hasher);

    Snapshot {
        board_key: board.stack().board_key,
        king_pawn_key: board.stack().king_pawn_key,
        material_key: board.stack().material_key,
        psq: board.psq_scorepair(),
        fen_hash: hasher.finish(),
    }
}

/// Re-derives every incremental key from the piece placement alone.
fn recomputed_keys(board: &Board) -> (u64, u64, u64) {
    let fresh = Board::from_fen(&board.to_fen(), board.is_chess960()).unwrap();
    let top = fresh.stack();
    (top.board_key, top.king_pawn_key, top.material_key)
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(64))]

    /// Walking a random legal line and unwinding it restores the board
    /// bit-exactly, including all incremental keys and the PSQT sum.
    #[test]
    fn make_unmake_roundtrip(
        fen_index in 0usize..FEN_CORPUS.len(),
        choices in prop::collection::vec(0usize..218, 1..40),
    ) {
        let mut board = Board::from_fen(FEN_CORPUS[fen_index], false).unwrap();
        let mut trail = Vec::new();
        let mut snapshots = vec![snapshot(&board)];

        for &choice in &choices {
            let mut list = Movelist::new();
            generate_legal(&mut list, &board);
            if list.is_empty() {
                break;
            }
            let mv = list.as_slice()[choice % list.len()];
            board.do_move(mv);
            trail.push(mv);
            snapshots.push(snapshot(&board));
        }

        // Incremental keys must match a from-scratch recomputation.
        let incremental = (
            board.stack().board_key,
            board.stack().king_pawn_key,
            board.stack().material_key,
        );
        prop_assert_eq!(recomputed_keys(&board), incremental);

        // Unwind and compare against every recorded snapshot.
        while let Some(mv) = trail.pop() {
            snapshots.pop();
            board.undo_move(mv);
            prop_assert_eq!(snapshot(&board), *snapshots.last().unwrap());
        }
    }

    /// Every generated legal move passes both validity predicates.
    #[test]
    fn generated_moves_validate(fen_index in 0usize..FEN_CORPUS.len()) {
        let board = Board::from_fen(FEN_CORPUS[fen_index], false).unwrap();
        let mut list = Movelist::new();
        generate_legal(&mut list, &board);

        for &mv in list.iter() {
            prop_assert!(board.move_is_pseudo_legal(mv));
            prop_assert!(board.move_is_legal(mv));
        }
    }

    /// The gives-check predicate agrees with actually making the move.
    #[test]
    fn gives_check_matches_reality(
        fen_index in 0usize..FEN_CORPUS.len(),
        choices in prop::collection::vec(0usize..218, 1..20),
    ) {
        let mut board = Board::from_fen(FEN_CORPUS[fen_index], false).unwrap();

        for &choice in &choices {
            let mut list = Movelist::new();
            generate_legal(&mut list, &board);
            if list.is_empty() {
                break;
            }
            let mv = list.as_slice()[choice % list.len()];
            let predicted = board.move_gives_check(mv);
            board.do_move(mv);
            prop_assert_eq!(predicted, board.in_check(), "{:?}", mv);
        }
    }
}

#[test]
fn pseudo_legal_accepts_exactly_the_generated_set() {
    use cinder::board::types::Move;

    for fen in FEN_CORPUS {
        let board = Board::from_fen(fen, false).unwrap();
        let mut list = Movelist::new();
        generate_pseudo(&mut list, &board);

        for raw in 0..=u16::MAX {
            let mv = Move(raw);
            let accepted = board.move_is_pseudo_legal(mv);
            let generated = list.contains(mv);
            assert_eq!(accepted, generated, "{fen} {mv:?}");
        }
    }
}

#[test]
fn fifty_move_draw_requires_no_mate() {
    // Rule-50 counter expired, but the side to move is checkmated: the
    // mate takes precedence over the draw claim.
    let mated = Board::from_fen("6k1/6Q1/6K1/8/8/8/8/8 b - - 100 80", false).unwrap();
    assert!(!mated.game_is_drawn(0));

    // Expired counter in a quiet position: drawn.
    let quiet = Board::from_fen("8/8/8/4k3/8/4K3/4R3/8 w - - 100 90", false).unwrap();
    assert!(quiet.game_is_drawn(0));
}
