//! Perft: legal move-path enumeration for move generator validation.

use crate::board::movegen::{generate_legal, Movelist};
use crate::board::Board;

/// Counts the leaf nodes of the legal move tree to the given depth. Depth
/// one is answered by bulk counting, which skips the make/unmake work for
/// the whole last ply.
pub fn perft(board: &mut Board, depth: usize) -> u64 {
    if depth == 0 {
        return 1;
    }

    let mut list = Movelist::new();
    generate_legal(&mut list, board);

    if depth == 1 {
        return list.len() as u64;
    }

    let mut sum = 0;
    for &mv in list.iter() {
        board.do_move(mv);
        sum += perft(board, depth - 1);
        board.undo_move(mv);
    }

    sum
}

/// Per-move breakdown at the root, matching the conventional
/// `perft divide` output used when hunting generator bugs.
pub fn perft_divide(board: &mut Board, depth: usize) -> Vec<(String, u64)> {
    let mut list = Movelist::new();
    generate_legal(&mut list, board);

    let mut results = Vec::with_capacity(list.len());
    for &mv in list.iter() {
        board.do_move(mv);
        let nodes = if depth <= 1 { 1 } else { perft(board, depth - 1) };
        board.undo_move(mv);
        results.push((board.move_to_uci(mv), nodes));
    }

    results
}

#[cfg(test)]
mod tests {
    use super::*;

    fn perft_of(fen: &str, depth: usize) -> u64 {
        let mut board = Board::from_fen(fen, false).unwrap();
        perft(&mut board, depth)
    }

    #[test]
    fn test_startpos_shallow() {
        assert_eq!(perft_of(Board::STARTPOS, 1), 20);
        assert_eq!(perft_of(Board::STARTPOS, 2), 400);
        assert_eq!(perft_of(Board::STARTPOS, 3), 8_902);
        assert_eq!(perft_of(Board::STARTPOS, 4), 197_281);
    }

    #[test]
    fn test_kiwipete() {
        let fen = "r3k2r/p1ppqpb1/bn2pnp1/3PN3/1p2P3/2N2Q1p/PPPBBPPP/R3K2R w KQkq - 0 1";
        assert_eq!(perft_of(fen, 1), 48);
        assert_eq!(perft_of(fen, 2), 2_039);
        assert_eq!(perft_of(fen, 3), 97_862);
    }

    #[test]
    fn test_en_passant_pins() {
        // Position 3 from the CPW perft suite, heavy on ep edge cases.
        let fen = "8/2p5/3p4/KP5r/1R3p1k/8/4P1P1/8 w - - 0 1";
        assert_eq!(perft_of(fen, 1), 14);
        assert_eq!(perft_of(fen, 2), 191);
        assert_eq!(perft_of(fen, 3), 2_812);
        assert_eq!(perft_of(fen, 4), 43_238);
        assert_eq!(perft_of(fen, 5), 674_624);
    }

    #[test]
    fn test_promotion_heavy() {
        // Position 4: promotions, underpromotions and checks.
        let fen = "r3k2r/Pppp1ppp/1b3nbN/nP6/BBP1P3/q4N2/Pp1P2PP/R2Q1RK1 w kq - 0 1";
        assert_eq!(perft_of(fen, 1), 6);
        assert_eq!(perft_of(fen, 2), 264);
        assert_eq!(perft_of(fen, 3), 9_467);
        assert_eq!(perft_of(fen, 4), 422_333);
    }

    #[test]
    fn test_talkchess_position() {
        // Position 5: castling rights subtleties.
        let fen = "rnbq1k1r/pp1Pbppp/2p5/8/2B5/8/PPP1NnPP/RNBQK2R w KQ - 1 8";
        assert_eq!(perft_of(fen, 1), 44);
        assert_eq!(perft_of(fen, 2), 1_486);
        assert_eq!(perft_of(fen, 3), 62_379);
    }

    #[test]
    fn test_divide_sums_to_perft() {
        let mut board = Board::startpos();
        let divide = perft_divide(&mut board, 3);
        let total: u64 = divide.iter().map(|(_, n)| n).sum();
        assert_eq!(total, 8_902);
    }
}
