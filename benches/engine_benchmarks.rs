//! Criterion benchmarks for the hot paths: movegen (via perft), static
//! evaluation, and fixed-depth search.

use criterion::{criterion_group, criterion_main, Criterion};

use cinder::board::Board;
use cinder::eval::king_pawn::KingPawnTable;
use cinder::perft::perft;
use cinder::search::{SearchParams, Worker};

const MIDGAME_FEN: &str = "r1bq1rk1/pp2ppbp/2np2p1/2n5/P3PP2/N1P2N2/1PB3PP/R1B1QRK1 b - - 0 1";
const ENDGAME_FEN: &str = "8/2p5/3p4/KP5r/1R3p1k/8/4P1P1/8 w - - 0 1";

fn bench_perft(c: &mut Criterion) {
    c.bench_function("perft_startpos_4", |b| {
        let mut board = Board::startpos();
        b.iter(|| perft(&mut board, 4));
    });

    c.bench_function("perft_kiwipete_3", |b| {
        let mut board = Board::from_fen(
            "r3k2r/p1ppqpb1/bn2pnp1/3PN3/1p2P3/2N2Q1p/PPPBBPPP/R3K2R w KQkq - 0 1",
            false,
        )
        .unwrap();
        b.iter(|| perft(&mut board, 3));
    });
}

fn bench_evaluate(c: &mut Criterion) {
    c.bench_function("evaluate_midgame", |b| {
        let board = Board::from_fen(MIDGAME_FEN, false).unwrap();
        let mut cache = KingPawnTable::new();
        b.iter(|| cinder::eval::evaluate(&board, &mut cache));
    });

    c.bench_function("evaluate_endgame", |b| {
        let board = Board::from_fen(ENDGAME_FEN, false).unwrap();
        let mut cache = KingPawnTable::new();
        b.iter(|| cinder::eval::evaluate(&board, &mut cache));
    });
}

fn bench_search(c: &mut Criterion) {
    c.bench_function("search_startpos_depth_8", |b| {
        b.iter(|| {
            let mut worker = Worker::standalone();
            let board = Board::startpos();
            let params = SearchParams {
                depth: Some(8),
                ..SearchParams::default()
            };
            worker.init_search_data(&board, &params);
            worker.worker_search();
            worker.root_moves[0].mv
        });
    });
}

criterion_group!(benches, bench_perft, bench_evaluate, bench_search);
criterion_main!(benches);
