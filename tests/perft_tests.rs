//! Perft validation against the well-known reference counts.

use cinder::board::Board;
use cinder::perft::perft;

fn perft_of(fen: &str, depth: usize) -> u64 {
    let mut board = Board::from_fen(fen, false).unwrap();
    perft(&mut board, depth)
}

const KIWIPETE: &str = "r3k2r/p1ppqpb1/bn2pnp1/3PN3/1p2P3/2N2Q1p/PPPBBPPP/R3K2R w KQkq - 0 1";

#[test]
fn startpos_perft_5() {
    assert_eq!(perft_of(Board::STARTPOS, 5), 4_865_609);
}

#[test]
#[ignore = "slow; run with --ignored for the full sweep"]
fn startpos_perft_6() {
    assert_eq!(perft_of(Board::STARTPOS, 6), 119_060_324);
}

#[test]
fn kiwipete_perft_4() {
    assert_eq!(perft_of(KIWIPETE, 4), 4_085_603);
}

#[test]
#[ignore = "slow; run with --ignored for the full sweep"]
fn kiwipete_perft_5() {
    assert_eq!(perft_of(KIWIPETE, 5), 193_690_690);
}

#[test]
fn endgame_perft_6() {
    assert_eq!(perft_of("8/2p5/3p4/KP5r/1R3p1k/8/4P1P1/8 w - - 0 1", 6), 11_030_083);
}

#[test]
fn promotion_perft_5() {
    assert_eq!(
        perft_of("r3k2r/Pppp1ppp/1b3nbN/nP6/BBP1P3/q4N2/Pp1P2PP/R2Q1RK1 w kq - 0 1", 5),
        15_833_292
    );
}

#[test]
fn talkchess_perft_4() {
    assert_eq!(
        perft_of("rnbq1k1r/pp1Pbppp/2p5/8/2B5/8/PPP1NnPP/RNBQK2R w KQ - 1 8", 4),
        2_103_487
    );
}

#[test]
fn cpw_position6_perft_4() {
    assert_eq!(
        perft_of(
            "r4rk1/1pp1qppp/p1np1n2/2b1p1B1/2B1P1b1/P1NP1N2/1PP1QPPP/R4RK1 w - - 0 10",
            4
        ),
        3_894_594
    );
}

#[test]
fn chess960_moves_roundtrip() {
    use cinder::board::movegen::{generate_legal, Movelist};

    // Chess960 position with shredder-style castling rights. Every legal
    // move, castling included, must survive a UCI text round trip.
    let board = Board::from_fen(
        "bqnb1rkr/pp3ppp/3ppn2/2p5/5P2/P2P4/NPP1P1PP/BQ1BNRKR w HFhf - 0 9",
        true,
    )
    .unwrap();

    let mut list = Movelist::new();
    generate_legal(&mut list, &board);
    assert!(!list.is_empty());

    for &mv in list.iter() {
        let text = board.move_to_uci(mv);
        assert_eq!(board.uci_to_move(&text), mv, "{text}");
    }

    // Perft is self-consistent: depth n+1 equals the sum of the children's
    // depth-n counts.
    let mut board = board;
    let total = perft(&mut board, 3);
    let mut sum = 0;
    let mut list2 = Movelist::new();
    generate_legal(&mut list2, &board);
    for &mv in list2.iter() {
        board.do_move(mv);
        sum += perft(&mut board, 2);
        board.undo_move(mv);
    }
    assert_eq!(total, sum);
}
