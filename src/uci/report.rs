//! Serialized UCI output.
//!
//! All engine output funnels through one mutex so that worker `info`
//! lines never interleave with frontend replies.

use once_cell::sync::Lazy;
use parking_lot::Mutex;

use crate::board::types::{Move, Score, MATE, MATE_FOUND};
use crate::board::Board;
use crate::engine::EngineOptions;
use crate::search::RootMove;
use crate::tt::Bound;

use super::wdl::{normalized_score, WdlValue};

static STDOUT_LOCK: Lazy<Mutex<()>> = Lazy::new(|| Mutex::new(()));

/// Prints one line under the output lock.
pub fn print_line(line: &str) {
    use std::io::Write;
    let _guard = STDOUT_LOCK.lock();
    let stdout = std::io::stdout();
    let mut handle = stdout.lock();
    let _ = writeln!(handle, "{line}");
    let _ = handle.flush();
}

/// `info string error: ...` diagnostics for recoverable parse problems.
pub fn print_error(message: &str) {
    print_line(&format!("info string error: {message}"));
}

fn format_score(score: Score, bound: Bound, options: &EngineOptions, material: u32) -> String {
    let mut text = if score.abs() >= MATE_FOUND {
        let plies = MATE - score.abs();
        let mate_in = (plies + 1) / 2;
        if score > 0 {
            format!("mate {mate_in}")
        } else {
            format!("mate -{mate_in}")
        }
    } else {
        let shown = if options.normalize_score {
            normalized_score(score)
        } else {
            score
        };
        format!("cp {shown}")
    };

    if options.show_wdl {
        let wdl = WdlValue::new(score, material);
        text.push_str(&format!(" wdl {} {} {}", wdl.win, wdl.draw, wdl.loss));
    }

    match bound {
        Bound::Lower => text.push_str(" lowerbound"),
        Bound::Upper => text.push_str(" upperbound"),
        _ => {}
    }

    text
}

/// One `info ... pv ...` line for a root move.
#[allow(clippy::too_many_arguments)]
pub fn print_pv(
    board: &Board,
    root_move: &RootMove,
    multipv: usize,
    depth: u16,
    time_ms: u64,
    bound: Bound,
    nodes: u64,
    hashfull: usize,
    options: &EngineOptions,
) {
    let score = if root_move.score == -crate::board::types::INF_SCORE {
        root_move.previous_score
    } else {
        root_move.score
    };

    let nps = nodes * 1000 / time_ms.max(1);
    let pv: Vec<String> = root_move
        .pv
        .iter()
        .map(|&mv| board.move_to_uci(mv))
        .collect();

    print_line(&format!(
        "info depth {} seldepth {} multipv {} score {} nodes {} nps {} hashfull {} time {} pv {}",
        depth,
        root_move.seldepth,
        multipv,
        format_score(score, bound, options, board.material_count()),
        nodes,
        nps,
        hashfull,
        time_ms,
        pv.join(" ")
    ));
}

pub fn print_currmove(board: &Board, depth: i32, mv: Move, number: i32) {
    print_line(&format!(
        "info depth {} currmove {} currmovenumber {}",
        depth,
        board.move_to_uci(mv),
        number
    ));
}

/// The root has no legal moves: mate or stalemate report.
pub fn print_no_legal_moves(in_check: bool) {
    print_line(&format!(
        "info depth 0 score {} 0",
        if in_check { "mate" } else { "cp" }
    ));
}

pub fn print_bestmove(board: &Board, bestmove: Move, ponder: Move) {
    let mut line = if bestmove.is_none() {
        "bestmove 0000".to_string()
    } else {
        format!("bestmove {}", board.move_to_uci(bestmove))
    };

    if !ponder.is_none() {
        let mut after = board.clone();
        after.do_move(bestmove);
        line.push_str(&format!(" ponder {}", after.move_to_uci(ponder)));
    }

    print_line(&line);
}

pub fn print_perft(nodes: u64, nps: u64, time_ms: u64) {
    print_line(&format!("info nodes {nodes} nps {nps} time {time_ms}"));
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_format_mate_scores() {
        let options = EngineOptions::default();
        assert_eq!(
            format_score(MATE - 1, Bound::Exact, &options, 58),
            "mate 1"
        );
        assert_eq!(
            format_score(-(MATE - 2), Bound::Exact, &options, 58),
            "mate -1"
        );
        assert_eq!(
            format_score(MATE - 5, Bound::Exact, &options, 58),
            "mate 3"
        );
    }

    #[test]
    fn test_format_cp_with_bounds() {
        let mut options = EngineOptions::default();
        options.normalize_score = false;
        assert_eq!(format_score(33, Bound::Lower, &options, 58), "cp 33 lowerbound");
        assert_eq!(format_score(-7, Bound::Upper, &options, 58), "cp -7 upperbound");
    }

    #[test]
    fn test_format_wdl() {
        let mut options = EngineOptions::default();
        options.show_wdl = true;
        options.normalize_score = false;
        let text = format_score(0, Bound::Exact, &options, 58);
        assert!(text.starts_with("cp 0 wdl "));
    }
}
