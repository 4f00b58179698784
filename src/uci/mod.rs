//! UCI frontend: stdin command loop and engine state ownership.

pub mod bench;
pub mod options;
pub mod report;
pub mod wdl;

use std::io::BufRead;
use std::process::ExitCode;

use crate::board::Board;
use crate::engine::{EngineOptions, WorkerPool};
use crate::search::SearchParams;

/// The engine as seen by the GUI: one board, one worker pool, and the
/// current option values.
struct Engine {
    board: Board,
    pool: WorkerPool,
    options: EngineOptions,
}

impl Engine {
    fn new() -> Engine {
        let options = EngineOptions::default();
        Engine {
            board: Board::startpos(),
            pool: WorkerPool::new(options.clone()),
            options,
        }
    }

    fn cmd_position(&mut self, args: &str) {
        let mut tokens = args.split_whitespace().peekable();
        let mut board = None;

        match tokens.next() {
            Some("startpos") => {
                board = Some(Board::startpos());
            }
            Some("fen") => {
                let mut fen_fields = Vec::new();
                while let Some(&token) = tokens.peek() {
                    if token == "moves" {
                        break;
                    }
                    fen_fields.push(token);
                    tokens.next();
                }

                match Board::from_fen(&fen_fields.join(" "), self.options.chess960) {
                    Ok(parsed) => board = Some(parsed),
                    Err(err) => {
                        report::print_error(&format!("invalid FEN: {err}"));
                        board = Some(Board::startpos());
                    }
                }
            }
            _ => {
                report::print_error("position expects 'startpos' or 'fen'");
                return;
            }
        }

        let Some(mut board) = board else { return };

        if tokens.next() == Some("moves") {
            for text in tokens {
                let mv = board.uci_to_move(text);
                if mv.is_none() {
                    report::print_error(&format!("illegal move '{text}' ignored"));
                    break;
                }
                board.do_move(mv);
            }
        }

        self.board = board;
    }

    fn cmd_go(&mut self, args: &str) {
        let mut params = SearchParams::default();
        let mut tokens = args.split_whitespace().peekable();

        while let Some(token) = tokens.next() {
            match token {
                "wtime" => params.wtime = tokens.next().and_then(|v| v.parse().ok()),
                "btime" => params.btime = tokens.next().and_then(|v| v.parse().ok()),
                "winc" => params.winc = tokens.next().and_then(|v| v.parse().ok()),
                "binc" => params.binc = tokens.next().and_then(|v| v.parse().ok()),
                "movestogo" => params.movestogo = tokens.next().and_then(|v| v.parse().ok()),
                "depth" => params.depth = tokens.next().and_then(|v| v.parse().ok()),
                "nodes" => params.nodes = tokens.next().and_then(|v| v.parse().ok()),
                "mate" => params.mate = tokens.next().and_then(|v| v.parse().ok()),
                "movetime" => params.movetime = tokens.next().and_then(|v| v.parse().ok()),
                "perft" => params.perft = tokens.next().and_then(|v| v.parse().ok()),
                "infinite" => params.infinite = true,
                "ponder" => params.ponder = true,
                "searchmoves" => {
                    while let Some(&text) = tokens.peek() {
                        let mv = self.board.uci_to_move(text);
                        if mv.is_none() {
                            break;
                        }
                        params.searchmoves.push(mv);
                        tokens.next();
                    }
                }
                _ => {}
            }
        }

        self.pool.set_options(self.options.clone());
        self.pool.start_search(&self.board, &params);
    }

    fn cmd_setoption(&mut self, args: &str) {
        let Some((name, value)) = options::parse_setoption(args) else {
            report::print_error("setoption expects 'name <id> [value <x>]'");
            return;
        };

        if !options::apply_setoption(
            &mut self.pool,
            &mut self.options,
            &name,
            value.as_deref(),
        ) {
            report::print_error(&format!("unknown option '{name}'"));
            return;
        }

        // Chess960 changes move encoding; rebuild the board under the new
        // convention.
        if name.trim().eq_ignore_ascii_case("uci_chess960") {
            if let Ok(board) = Board::from_fen(&self.board.to_fen(), self.options.chess960) {
                self.board = board;
            }
        }
    }

    /// Debug board dump, kept because it is invaluable over a pipe.
    fn cmd_d(&self) {
        let mut lines = String::new();
        lines.push_str(" +---+---+---+---+---+---+---+---+\n");
        for rank in (0..8).rev() {
            for file in 0..8 {
                let square = crate::board::types::Square::new(
                    crate::board::types::File(file),
                    crate::board::types::Rank(rank),
                );
                let piece = self.board.piece_on(square);
                let c = if piece.is_none() { ' ' } else { piece.to_char() };
                lines.push_str(&format!(" | {c}"));
            }
            lines.push_str(&format!(" | {}\n +---+---+---+---+---+---+---+---+\n", rank + 1));
        }
        lines.push_str("   a   b   c   d   e   f   g   h\n");
        lines.push_str(&format!("\nFEN: {}\n", self.board.to_fen()));
        lines.push_str(&format!("Key: {:016X}", self.board.stack().board_key));
        report::print_line(&lines);
    }

    /// Returns false when the loop should exit.
    fn handle_line(&mut self, line: &str) -> bool {
        let trimmed = line.trim();
        let (command, args) = match trimmed.split_once(char::is_whitespace) {
            Some((command, args)) => (command, args),
            None => (trimmed, ""),
        };

        match command {
            "" => {}
            "uci" => options::print_options(&self.options),
            "isready" => {
                report::print_line("readyok");
            }
            "ucinewgame" => {
                self.pool.new_game();
            }
            "position" => self.cmd_position(args),
            "go" => self.cmd_go(args),
            "stop" => self.pool.stop(),
            "ponderhit" => self.pool.ponderhit(),
            "setoption" => self.cmd_setoption(args),
            "d" => self.cmd_d(),
            "bench" => {
                let depth = args
                    .split_whitespace()
                    .next()
                    .and_then(|v| v.parse::<u16>().ok())
                    .unwrap_or(bench::DEFAULT_BENCH_DEPTH);
                bench::run(&mut self.pool, depth);
            }
            "quit" => {
                self.pool.stop();
                return false;
            }
            _ => report::print_error(&format!("unknown command '{command}'")),
        }

        true
    }
}

/// Reads UCI commands from stdin until `quit` or end of input.
pub fn run() -> ExitCode {
    let mut engine = Engine::new();
    let stdin = std::io::stdin();

    for line in stdin.lock().lines() {
        let Ok(line) = line else { break };
        if !engine.handle_line(&line) {
            break;
        }
    }

    engine.pool.stop();
    engine.pool.wait_search_completion();
    ExitCode::SUCCESS
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_position_startpos_and_moves() {
        let mut engine = Engine::new();
        engine.cmd_position("startpos moves e2e4 e7e5 g1f3");
        assert_eq!(
            engine.board.to_fen(),
            "rnbqkbnr/pppp1ppp/8/4p3/4P3/5N2/PPPP1PPP/RNBQKB1R b KQkq - 1 2"
        );
    }

    #[test]
    fn test_position_fen() {
        let mut engine = Engine::new();
        let fen = "r3k2r/p1ppqpb1/bn2pnp1/3PN3/1p2P3/2N2Q1p/PPPBBPPP/R3K2R w KQkq - 0 1";
        engine.cmd_position(&format!("fen {fen}"));
        assert_eq!(engine.board.to_fen(), fen);
    }

    #[test]
    fn test_bad_fen_falls_back_to_startpos() {
        let mut engine = Engine::new();
        engine.cmd_position("fen not/a/real/fen w - - 0 1");
        assert_eq!(engine.board.to_fen(), Board::STARTPOS);
    }

    #[test]
    fn test_illegal_move_stops_application() {
        let mut engine = Engine::new();
        engine.cmd_position("startpos moves e2e4 e2e4 e7e5");
        // The first move applies, the rest are dropped.
        assert_eq!(
            engine.board.to_fen(),
            "rnbqkbnr/pppppppp/8/8/4P3/8/PPPP1PPP/RNBQKB1R b KQkq - 0 1"
        );
    }

    #[test]
    fn test_go_depth_completes() {
        let mut engine = Engine::new();
        engine.cmd_position("startpos");
        engine.cmd_go("depth 4");
        engine.pool.wait_search_completion();
    }

    #[test]
    fn test_quit_returns_false() {
        let mut engine = Engine::new();
        assert!(engine.handle_line("isready"));
        assert!(!engine.handle_line("quit"));
    }
}
