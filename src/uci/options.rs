//! UCI option registry.

use crate::engine::{EngineOptions, WorkerPool};

use super::report;

/// Print a UCI spin option.
fn print_spin(name: &str, default: impl std::fmt::Display, min: impl std::fmt::Display, max: impl std::fmt::Display) {
    report::print_line(&format!(
        "option name {name} type spin default {default} min {min} max {max}"
    ));
}

/// Print a UCI check option.
fn print_check(name: &str, default: bool) {
    report::print_line(&format!("option name {name} type check default {default}"));
}

/// The `uci` identification block.
pub fn print_options(options: &EngineOptions) {
    report::print_line(concat!("id name cinder ", env!("CARGO_PKG_VERSION")));
    report::print_line("id author the cinder developers");

    print_spin("Threads", options.threads, 1, 512);
    print_spin("Hash", options.hash_mb, 1, 33_554_432);
    print_spin("MoveOverhead", options.move_overhead, 1, 5_000);
    print_spin("MultiPV", options.multi_pv, 1, 500);
    print_check("UCI_Chess960", options.chess960);
    print_check("UCI_ShowWDL", options.show_wdl);
    print_check("NormalizeScore", options.normalize_score);
    print_check("TimemanForNodes", options.timeman_for_nodes);
    print_check("Ponder", options.ponder);
    report::print_line("option name Clear Hash type button");

    report::print_line("uciok");
}

fn parse_bool(value: &str) -> Option<bool> {
    match value.trim().to_ascii_lowercase().as_str() {
        "true" | "1" => Some(true),
        "false" | "0" => Some(false),
        _ => None,
    }
}

/// Applies a `setoption` command. Returns false when the option name is
/// unknown; the position-dependent Chess960 switch is handled by the
/// caller.
pub fn apply_setoption(
    pool: &mut WorkerPool,
    options: &mut EngineOptions,
    name: &str,
    value: Option<&str>,
) -> bool {
    // Be lenient about spacing and casing in option names.
    let normalized = name.trim().to_ascii_lowercase().replace(' ', "");

    match normalized.as_str() {
        "threads" => {
            if let Some(count) = value.and_then(|v| v.parse::<usize>().ok()) {
                options.threads = count.clamp(1, 512);
                pool.set_options(options.clone());
                pool.resize_workers(options.threads);
            }
        }
        "hash" => {
            if let Some(megabytes) = value.and_then(|v| v.parse::<usize>().ok()) {
                options.hash_mb = megabytes.clamp(1, 33_554_432);
                pool.set_options(options.clone());
                pool.resize_hash(options.hash_mb);
            }
        }
        "moveoverhead" => {
            if let Some(ms) = value.and_then(|v| v.parse::<u64>().ok()) {
                options.move_overhead = ms.clamp(1, 5_000);
            }
        }
        "multipv" => {
            if let Some(lines) = value.and_then(|v| v.parse::<u32>().ok()) {
                options.multi_pv = lines.clamp(1, 500);
            }
        }
        "uci_chess960" => {
            if let Some(flag) = value.and_then(parse_bool) {
                options.chess960 = flag;
            }
        }
        "uci_showwdl" => {
            if let Some(flag) = value.and_then(parse_bool) {
                options.show_wdl = flag;
            }
        }
        "normalizescore" => {
            if let Some(flag) = value.and_then(parse_bool) {
                options.normalize_score = flag;
            }
        }
        "timemanfornodes" => {
            if let Some(flag) = value.and_then(parse_bool) {
                options.timeman_for_nodes = flag;
            }
        }
        "ponder" => {
            if let Some(flag) = value.and_then(parse_bool) {
                options.ponder = flag;
            }
        }
        "clearhash" => {
            pool.clear_hash();
        }
        _ => return false,
    }

    pool.set_options(options.clone());
    true
}

/// Splits `setoption name <n...> [value <v...>]` into its two parts.
pub fn parse_setoption(args: &str) -> Option<(String, Option<String>)> {
    let mut name_parts: Vec<&str> = Vec::new();
    let mut value_parts: Vec<&str> = Vec::new();
    let mut mode = "";

    for token in args.split_whitespace() {
        match token {
            "name" => mode = "name",
            "value" => mode = "value",
            _ => match mode {
                "name" => name_parts.push(token),
                "value" => value_parts.push(token),
                _ => {}
            },
        }
    }

    if name_parts.is_empty() {
        return None;
    }

    let value = if value_parts.is_empty() {
        None
    } else {
        Some(value_parts.join(" "))
    };

    Some((name_parts.join(" "), value))
}
