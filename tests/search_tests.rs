//! End-to-end search behavior through the worker pool.

use cinder::board::types::{mate_in, MATE_FOUND};
use cinder::board::Board;
use cinder::engine::{EngineOptions, WorkerPool};
use cinder::search::{SearchParams, Worker};

fn depth_params(depth: u16) -> SearchParams {
    SearchParams {
        depth: Some(depth),
        ..SearchParams::default()
    }
}

fn best_of(fen: &str, depth: u16) -> (String, i16) {
    let mut worker = Worker::standalone();
    let board = Board::from_fen(fen, false).unwrap();
    worker.init_search_data(&board, &depth_params(depth));
    worker.worker_search();
    (
        board.move_to_uci(worker.root_moves[0].mv),
        worker.root_moves[0].previous_score,
    )
}

#[test]
fn mate_in_one_rook_ladder() {
    let (best, score) = best_of("6k1/8/6K1/8/8/8/8/6R1 w - - 0 1", 3);
    assert_eq!(best, "g1g8");
    assert_eq!(score, mate_in(1));
}

#[test]
fn back_rank_mate() {
    // The f7-h7 pawns box in their own king; Re8 is mate.
    let (best, score) = best_of("6k1/5ppp/8/8/8/8/8/4R1K1 w - - 0 1", 6);
    assert_eq!(best, "e1e8");
    assert!(score >= MATE_FOUND);
}

#[test]
fn avoids_stalemate_trap() {
    // KQ vs K: the engine must make progress rather than stalemate.
    let (_, score) = best_of("7k/8/6K1/4Q3/8/8/8/8 w - - 0 1", 8);
    assert!(score > 9000);
}

#[test]
fn hanging_queen_gets_taken() {
    let (best, _) = best_of(
        "rnb1kbnr/ppp1pppp/8/3q4/4P3/8/PPPP1PPP/RNBQKBNR w KQkq - 0 3",
        5,
    );
    assert_eq!(best, "e4d5");
}

#[test]
fn multipv_reports_distinct_lines() {
    let mut worker = Worker::standalone();
    worker.options.multi_pv = 3;
    let board = Board::startpos();
    worker.init_search_data(&board, &depth_params(6));
    worker.worker_search();

    // Root list is sorted with the searched lines in front; the top three
    // moves must be distinct.
    assert!(worker.root_moves.len() >= 3);
    let first = worker.root_moves[0].mv;
    let second = worker.root_moves[1].mv;
    let third = worker.root_moves[2].mv;
    assert_ne!(first, second);
    assert_ne!(second, third);
    assert!(worker.root_moves[0].previous_score >= worker.root_moves[1].previous_score);
}

#[test]
fn node_limited_search_stops() {
    let mut pool = WorkerPool::new(EngineOptions::default());
    let board = Board::startpos();
    let params = SearchParams {
        nodes: Some(20_000),
        depth: Some(64),
        ..SearchParams::default()
    };
    pool.start_search(&board, &params);
    pool.wait_search_completion();

    // The node budget is honored within one check interval.
    assert!(pool.total_nodes() < 200_000);
}

#[test]
fn pool_survives_back_to_back_searches() {
    let mut pool = WorkerPool::new(EngineOptions::default());
    let board = Board::startpos();
    for _ in 0..3 {
        pool.start_search(&board, &depth_params(5));
        pool.wait_search_completion();
    }
}

#[test]
fn smp_search_completes() {
    let options = EngineOptions {
        threads: 4,
        ..EngineOptions::default()
    };
    let mut pool = WorkerPool::new(options);
    let board =
        Board::from_fen("r1bqkbnr/pppp1ppp/2n5/4p3/2B1P3/5N2/PPPP1PPP/RNBQK2R w KQkq - 4 4", false)
            .unwrap();
    pool.start_search(&board, &depth_params(8));
    pool.wait_search_completion();
    assert!(pool.total_nodes() > 0);
}

#[test]
fn single_worker_search_is_deterministic() {
    // With one thread and a fresh TT, two identical searches must agree.
    let first = best_of(
        "r2q1rk1/4bppp/p2p4/2pP4/3pP3/3Q4/PP1B1PPP/R3R1K1 w - - 0 1",
        7,
    );
    let second = best_of(
        "r2q1rk1/4bppp/p2p4/2pP4/3pP3/3Q4/PP1B1PPP/R3R1K1 w - - 0 1",
        7,
    );
    assert_eq!(first, second);
}

#[test]
fn threefold_line_is_scored_as_draw() {
    let mut worker = Worker::standalone();
    let mut board = Board::startpos();
    for text in [
        "g1f3", "g8f6", "f3g1", "f6g8", "g1f3", "g8f6", "f3g1", "f6g8",
    ] {
        let mv = board.uci_to_move(text);
        board.do_move(mv);
    }
    worker.init_search_data(&board, &depth_params(2));
    worker.worker_search();
    assert!(worker.root_moves[0].previous_score.abs() <= 1);
}
