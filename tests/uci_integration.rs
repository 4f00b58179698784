//! Frontend-level scenarios driven through the public pool API, mirroring
//! the UCI transcripts a GUI would produce.

use cinder::board::Board;
use cinder::engine::{EngineOptions, WorkerPool};
use cinder::search::SearchParams;

#[test]
fn stalemate_position_reports_no_moves() {
    // `go` on a stalemate must terminate immediately with bestmove 0000
    // (printed by the main worker; here we just require clean completion).
    let mut pool = WorkerPool::new(EngineOptions::default());
    let board = Board::from_fen("7k/5Q2/6K1/8/8/8/8/8 b - - 0 1", false).unwrap();
    let params = SearchParams {
        depth: Some(5),
        ..SearchParams::default()
    };
    pool.start_search(&board, &params);
    pool.wait_search_completion();
    assert_eq!(pool.total_nodes(), 0);
}

#[test]
fn checkmate_position_reports_no_moves() {
    let mut pool = WorkerPool::new(EngineOptions::default());
    let board = Board::from_fen("6k1/6Q1/6K1/8/8/8/8/8 b - - 0 1", false).unwrap();
    let params = SearchParams {
        depth: Some(3),
        ..SearchParams::default()
    };
    pool.start_search(&board, &params);
    pool.wait_search_completion();
    assert_eq!(pool.total_nodes(), 0);
}

#[test]
fn go_perft_matches_reference() {
    // `go perft N` runs through the main worker.
    let mut board = Board::startpos();
    assert_eq!(cinder::perft::perft(&mut board, 4), 197_281);

    let mut pool = WorkerPool::new(EngineOptions::default());
    let params = SearchParams {
        perft: Some(4),
        ..SearchParams::default()
    };
    pool.start_search(&board, &params);
    pool.wait_search_completion();
}

#[test]
fn stop_interrupts_long_search() {
    use std::time::{Duration, Instant};

    let mut pool = WorkerPool::new(EngineOptions::default());
    let board = Board::startpos();
    let params = SearchParams {
        infinite: true,
        ..SearchParams::default()
    };

    pool.start_search(&board, &params);
    std::thread::sleep(Duration::from_millis(100));

    let begin = Instant::now();
    pool.stop();
    pool.wait_search_completion();
    assert!(begin.elapsed() < Duration::from_secs(5));
}

#[test]
fn movetime_is_respected() {
    use std::time::{Duration, Instant};

    let mut pool = WorkerPool::new(EngineOptions::default());
    let board = Board::startpos();
    let params = SearchParams {
        movetime: Some(200),
        ..SearchParams::default()
    };

    let begin = Instant::now();
    pool.start_search(&board, &params);
    pool.wait_search_completion();
    // Allow generous slack for slow CI machines.
    assert!(begin.elapsed() < Duration::from_secs(5));
}

#[test]
fn chess960_search_completes_and_moves_parse() {
    let options = EngineOptions {
        chess960: true,
        ..EngineOptions::default()
    };
    let mut pool = WorkerPool::new(options);
    let fen = "bqnb1rkr/pp3ppp/3ppn2/2p5/5P2/P2P4/NPP1P1PP/BQ1BNRKR w HFhf - 0 9";
    let board = Board::from_fen(fen, true).unwrap();

    let params = SearchParams {
        depth: Some(8),
        ..SearchParams::default()
    };
    pool.start_search(&board, &params);
    pool.wait_search_completion();
    assert!(pool.total_nodes() > 0);

    // Any legal castling move must round-trip through its UCI text.
    use cinder::board::movegen::{generate_legal, Movelist};
    let mut list = Movelist::new();
    generate_legal(&mut list, &board);
    for &mv in list.iter() {
        assert_eq!(board.uci_to_move(&board.move_to_uci(mv)), mv);
    }
}

#[test]
fn searchmoves_restricts_the_root() {
    let mut pool = WorkerPool::new(EngineOptions::default());
    let board = Board::startpos();
    let params = SearchParams {
        depth: Some(4),
        searchmoves: vec![board.uci_to_move("a2a3")],
        ..SearchParams::default()
    };
    pool.start_search(&board, &params);
    pool.wait_search_completion();
    assert!(pool.total_nodes() > 0);
}
