//! Specialized endgame recognizers, keyed by material signature.
//!
//! The table maps material keys to either a scoring function (replacing
//! the whole evaluation) or a scaling function (damping the endgame term
//! of the tapered evaluation). Keys are the same piece-count Zobrist
//! signatures the board maintains incrementally.

use once_cell::sync::Lazy;

use crate::board::attack_tables::{bishop_attacks, forward_file_bb, knight_attacks, passed_pawn_span};
use crate::board::types::{
    Bitboard, Color, File, Piece, PieceType, Rank, Score, Square, DRAW, VICTORY,
};
use crate::board::zobrist::ZOBRIST;
use crate::board::{Board, PIECE_EG_VALUES, PIECE_MG_VALUES};

use super::king_pawn::compute_entry;
use super::kpk::{kpk_is_winning, normalize_square};

pub const SCALE_NORMAL: i32 = 256;
pub const SCALE_DRAW: i32 = 0;

pub type ScoreFn = fn(&Board, Color) -> Score;
pub type ScaleFn = fn(&Board, Color) -> i32;

const TABLE_SIZE: usize = 2048;

#[derive(Clone, Copy, Default)]
struct EndgameEntry {
    key: u64,
    strong_side: Option<Color>,
    score_fn: Option<ScoreFn>,
    scale_fn: Option<ScaleFn>,
}

struct EndgameTable {
    entries: Vec<EndgameEntry>,
}

/// Material key for an explicit piece-count list, mirroring the board's
/// incremental computation (one Zobrist term per piece instance).
fn material_key(counts: &[(Piece, u8)]) -> u64 {
    let mut key = 0u64;
    for &(piece, count) in counts {
        for i in 0..count {
            key ^= ZOBRIST.psq[piece.index()][i as usize];
        }
    }
    key
}

/// Parses a "KRPvKR"-style material string into white/black piece counts,
/// returning the key. The letters before 'v' describe the strong side.
fn key_from_material(white: &str, black: &str) -> u64 {
    let mut counts: Vec<(Piece, u8)> = Vec::new();

    for (text, color) in [(white, Color::White), (black, Color::Black)] {
        for c in text.chars() {
            let piece = Piece::new(color, PieceType::from_char(c).expect("valid piece letter"));
            match counts.iter_mut().find(|(p, _)| *p == piece) {
                Some((_, count)) => *count += 1,
                None => counts.push((piece, 1)),
            }
        }
    }

    material_key(&counts)
}

impl EndgameTable {
    fn new() -> EndgameTable {
        EndgameTable {
            entries: vec![EndgameEntry::default(); TABLE_SIZE],
        }
    }

    /// Linear probing keeps colliding material keys apart.
    fn slot_of(&self, key: u64) -> usize {
        let mut slot = (key % TABLE_SIZE as u64) as usize;
        while self.entries[slot].key != 0 && self.entries[slot].key != key {
            slot = (slot + 1) % TABLE_SIZE;
        }
        slot
    }

    fn entry_mut(&mut self, key: u64) -> &mut EndgameEntry {
        let slot = self.slot_of(key);
        let entry = &mut self.entries[slot];
        entry.key = key;
        entry
    }

    fn add_score(&mut self, material: &str, score_fn: ScoreFn) {
        let (strong, weak) = material.split_once('v').expect("material contains 'v'");

        let entry = self.entry_mut(key_from_material(strong, weak));
        entry.strong_side = Some(Color::White);
        entry.score_fn = Some(score_fn);

        // Mirror the entry unless the distribution is symmetric.
        if strong != weak {
            let entry = self.entry_mut(key_from_material(weak, strong));
            entry.strong_side = Some(Color::Black);
            entry.score_fn = Some(score_fn);
        }
    }

    fn add_scale(&mut self, material: &str, scale_fn: ScaleFn) {
        let (strong, weak) = material.split_once('v').expect("material contains 'v'");

        let entry = self.entry_mut(key_from_material(strong, weak));
        entry.strong_side = Some(Color::White);
        entry.scale_fn = Some(scale_fn);

        if strong != weak {
            let entry = self.entry_mut(key_from_material(weak, strong));
            entry.strong_side = Some(Color::Black);
            entry.scale_fn = Some(scale_fn);
        }
    }
}

static TABLE: Lazy<EndgameTable> = Lazy::new(|| {
    let mut table = EndgameTable::new();

    // Material-draw endgames.
    for material in [
        "KvK", "KNvK", "KBvK", "KNNvK", "KBvKN", "KNvKN", "KBvKB", "KBBvKB",
    ] {
        table.add_score(material, eval_draw);
    }

    // 3-man endgames.
    table.add_score("KPvK", eval_kpk);

    // 4-man endgames.
    table.add_score("KBNvK", eval_kbnk);
    table.add_score("KRvKP", eval_krkp);
    table.add_score("KRvKN", eval_krkn);
    table.add_score("KRvKB", eval_krkb);
    table.add_score("KQvKP", eval_kqkp);
    table.add_score("KQvKR", eval_kqkr);

    // 5-man endgames.
    table.add_score("KNPvKN", eval_kmpkn);
    table.add_score("KNPvKB", eval_kmpkb);
    table.add_score("KNNvKP", eval_knnkp);
    table.add_score("KBPvKN", eval_kmpkn);
    table.add_score("KBPvKB", eval_kmpkb);
    table.add_score("KRPvKR", eval_krpkr);

    // Scaling entries, stored under pawnless keys.
    table.add_scale("KvK", scale_kpsk);
    table.add_scale("KBvK", scale_kbpsk);

    table
});

/// Finds a scoring specialization for the current material, if any.
pub fn probe_score(board: &Board) -> Option<(ScoreFn, Color)> {
    let key = board.stack().material_key;
    let entry = &TABLE.entries[TABLE.slot_of(key)];

    if entry.key == key {
        if let (Some(score_fn), Some(strong)) = (entry.score_fn, entry.strong_side) {
            return Some((score_fn, strong));
        }
    }
    None
}

/// Finds a scaling specialization, matching on the pawnless material key.
/// The caller passes its own strong side (the side the endgame term
/// favors) to the returned function.
pub fn probe_scale(board: &Board) -> Option<ScaleFn> {
    let mut key = board.stack().material_key;

    for i in 0..board.piece_count(Piece::WHITE_PAWN) {
        key ^= ZOBRIST.psq[Piece::WHITE_PAWN.index()][i as usize];
    }
    for i in 0..board.piece_count(Piece::BLACK_PAWN) {
        key ^= ZOBRIST.psq[Piece::BLACK_PAWN.index()][i as usize];
    }

    let entry = &TABLE.entries[TABLE.slot_of(key)];
    if entry.key == key {
        return entry.scale_fn;
    }
    None
}

// --- Distance bonuses shared by the mating heuristics ---

/// Grows as the king approaches any board edge or corner.
pub fn corner_bonus(square: Square) -> Score {
    let file_center = square.file().0.min(square.file().0 ^ 7) as Score;
    let rank_center = square.rank().0.min(square.rank().0 ^ 7) as Score;
    200 - 20 * (file_center + rank_center)
}

/// Grows as the two squares come closer.
pub fn close_bonus(a: Square, b: Square) -> Score {
    20 * (7 - a.distance(b) as Score)
}

/// Grows as the two squares drift apart.
fn away_bonus(a: Square, b: Square) -> Score {
    16 * a.distance(b) as Score
}

// --- Scoring functions ---

fn eval_draw(_board: &Board, _strong: Color) -> Score {
    DRAW
}

fn eval_kpk(board: &Board, strong: Color) -> Score {
    let mut strong_king = board.king_square(strong);
    let mut pawn = board.piecetype_bb(PieceType::Pawn).first_square();
    let mut weak_king = board.king_square(strong.flip());
    let us = if board.side_to_move() == strong {
        Color::White
    } else {
        Color::Black
    };
    let flip_file = pawn.file() >= File::E;

    strong_king = normalize_square(strong, strong_king, flip_file);
    pawn = normalize_square(strong, pawn, flip_file);
    weak_king = normalize_square(strong, weak_king, flip_file);

    let score = if kpk_is_winning(weak_king, strong_king, pawn, us) {
        VICTORY + PIECE_EG_VALUES[1] + 3 * pawn.rank().0 as Score
    } else {
        DRAW
    };

    if us == Color::White {
        score
    } else {
        -score
    }
}

fn eval_kbnk(board: &Board, strong: Color) -> Score {
    let strong_king = board.king_square(strong);
    let mut weak_king = board.king_square(strong.flip());
    let mut score = VICTORY
        + PIECE_MG_VALUES[PieceType::Knight.index()]
        + PIECE_MG_VALUES[PieceType::Bishop.index()]
        + close_bonus(weak_king, strong_king);

    // Drive the defender towards a corner the bishop controls.
    if (board.piecetype_bb(PieceType::Bishop) & Bitboard::DARK_SQUARES).any() {
        weak_king = Square(weak_king.0 ^ 7);
    }

    score += 100 * (weak_king.file().0 as Score - weak_king.rank().0 as Score).abs();

    if board.side_to_move() == strong {
        score
    } else {
        -score
    }
}

fn eval_krkp(board: &Board, strong: Color) -> Score {
    let weak = strong.flip();
    let strong_king = board.king_square(strong);
    let strong_rook = board.piecetype_bb(PieceType::Rook).first_square();
    let weak_king = board.king_square(weak);
    let weak_pawn = board.piecetype_bb(PieceType::Pawn).first_square();
    let push_square = weak_pawn.shift(crate::board::types::Direction::pawn_push(weak));
    let promotion_square = Square::new(weak_pawn.file(), Rank::EIGHTH.relative(weak));
    let strong_tempo = board.side_to_move() == strong;
    let rook_eg = PIECE_EG_VALUES[PieceType::Rook.index()];

    let score = if forward_file_bb(strong, strong_king).contains(weak_pawn) {
        // The strong king controls the promotion path.
        rook_eg - strong_king.distance(weak_pawn) as Score
    } else if weak_king.distance(weak_pawn) as Score >= 3 + !strong_tempo as Score
        && weak_king.distance(strong_rook) >= 3
    {
        // The weak king can defend neither the rook nor the pawn.
        rook_eg - strong_king.distance(weak_pawn) as Score
    } else if weak_king.relative_rank(strong) <= Rank::THIRD
        && weak_king.distance(weak_pawn) == 1
        && strong_king.relative_rank(strong) >= Rank::FOURTH
        && strong_king.distance(weak_pawn) as Score >= 3 + strong_tempo as Score
    {
        // The pawn is escorted home and out of the strong king's reach.
        40 - 4 * strong_king.distance(weak_pawn) as Score
    } else {
        100 - 4 * (strong_king.distance(push_square) as Score
            - weak_king.distance(push_square) as Score
            - weak_pawn.distance(promotion_square) as Score)
    };

    if strong_tempo {
        score
    } else {
        -score
    }
}

fn eval_krkn(board: &Board, strong: Color) -> Score {
    let weak_king = board.king_square(strong.flip());
    let weak_knight = board.piecetype_bb(PieceType::Knight).first_square();
    let score = corner_bonus(weak_king) + away_bonus(weak_king, weak_knight);

    if board.side_to_move() == strong {
        score
    } else {
        -score
    }
}

fn eval_krkb(board: &Board, strong: Color) -> Score {
    let score = corner_bonus(board.king_square(strong.flip()));
    if board.side_to_move() == strong {
        score
    } else {
        -score
    }
}

fn eval_kqkp(board: &Board, strong: Color) -> Score {
    let weak = strong.flip();
    let strong_king = board.king_square(strong);
    let weak_king = board.king_square(weak);
    let weak_pawn = board.piecetype_bb(PieceType::Pawn).first_square();
    let mut score = close_bonus(weak_king, strong_king);

    // A knight- or bishop-file pawn on its seventh defended by the king can
    // hold the draw against the queen.
    let drawish_files = Bitboard::file(File::B)
        | Bitboard::file(File::D)
        | Bitboard::file(File::E)
        | Bitboard::file(File::G);
    if weak_pawn.relative_rank(weak) != Rank::SEVENTH
        || weak_king.distance(weak_pawn) != 1
        || drawish_files.contains(weak_pawn)
    {
        score += PIECE_EG_VALUES[PieceType::Queen.index()] - PIECE_EG_VALUES[1];
    }

    if board.side_to_move() == strong {
        score
    } else {
        -score
    }
}

fn eval_kqkr(board: &Board, strong: Color) -> Score {
    let strong_king = board.king_square(strong);
    let weak_king = board.king_square(strong.flip());
    let score = PIECE_EG_VALUES[PieceType::Queen.index()]
        - PIECE_EG_VALUES[PieceType::Rook.index()]
        + corner_bonus(weak_king)
        + close_bonus(weak_king, strong_king);

    if board.side_to_move() == strong {
        score
    } else {
        -score
    }
}

fn eval_knnkp(board: &Board, strong: Color) -> Score {
    let weak = strong.flip();
    let score = PIECE_EG_VALUES[1] + corner_bonus(board.king_square(weak))
        - 5 * board
            .piecetype_bb(PieceType::Pawn)
            .first_square()
            .relative_rank(weak)
            .index() as Score;

    if board.side_to_move() == strong {
        score
    } else {
        -score
    }
}

/// King + minor + pawn vs king + knight: drawish when the defender holds
/// the promotion path.
fn eval_kmpkn(board: &Board, strong: Color) -> Score {
    let kpe = compute_entry(board);
    let mut score = (kpe.value + board.psq_scorepair()).endgame();
    let weak = strong.flip();
    let strong_tempo = board.side_to_move() == strong;
    let strong_king = board.king_square(strong);
    let weak_king = board.king_square(weak);
    let pawn = board.piecetype_bb(PieceType::Pawn).first_square();
    let weak_knight = board.pieces_bb(weak, PieceType::Knight).first_square();
    let queening_path = forward_file_bb(strong, pawn);
    let span = passed_pawn_span(strong, pawn);

    if board.side_to_move() == Color::Black {
        score = -score;
    }

    if queening_path.contains(weak_king) {
        return score / 16;
    }
    if (queening_path & knight_attacks(weak_knight)).any() {
        return score / 8;
    }
    if span.contains(weak_king) && !span.contains(strong_king) && !strong_tempo {
        return score / 4;
    }

    score
}

/// Same as above with a bishop defender.
fn eval_kmpkb(board: &Board, strong: Color) -> Score {
    let kpe = compute_entry(board);
    let mut score = (kpe.value + board.psq_scorepair()).endgame();
    let weak = strong.flip();
    let strong_tempo = board.side_to_move() == strong;
    let strong_king = board.king_square(strong);
    let weak_king = board.king_square(weak);
    let pawn = board.piecetype_bb(PieceType::Pawn).first_square();
    let weak_bishop = board.pieces_bb(weak, PieceType::Bishop).first_square();
    let queening_path = forward_file_bb(strong, pawn);
    let span = passed_pawn_span(strong, pawn);

    if board.side_to_move() == Color::Black {
        score = -score;
    }

    if queening_path.contains(weak_king) {
        return score / 16;
    }
    if (queening_path & bishop_attacks(weak_bishop, board.occupancy_bb())).any() {
        return score / 8;
    }
    if span.contains(weak_king) && !span.contains(strong_king) && !strong_tempo {
        return score / 4;
    }

    score
}

/// KRP vs KR: recognize Philidor and back-rank defenses.
fn eval_krpkr(board: &Board, strong: Color) -> Score {
    let kpe = compute_entry(board);
    let mut score = (kpe.value + board.psq_scorepair()).endgame();
    let weak = strong.flip();
    let strong_tempo = board.side_to_move() == strong;
    let strong_king = board.king_square(strong).relative(strong);
    let weak_king = board.king_square(weak).relative(strong);
    let pawn = board
        .piecetype_bb(PieceType::Pawn)
        .first_square()
        .relative(strong);
    let weak_rook = board
        .pieces_bb(weak, PieceType::Rook)
        .first_square()
        .relative(strong);

    if board.side_to_move() == Color::Black {
        score = -score;
    }

    if passed_pawn_span(Color::White, pawn).contains(weak_king) {
        let sk = strong_king.rank();
        let wk = weak_king.rank();
        let sp = pawn.rank();
        let wr = weak_rook.rank();

        if wk == Rank::SIXTH || wk == Rank::SEVENTH {
            if wr == Rank::FIFTH && sk < Rank::FIFTH && sp < Rank::FIFTH {
                return score / 64;
            }
            if wr == Rank::FIRST && sp == Rank::FIFTH {
                return score / 64;
            }
        }

        if wk >= Rank::SEVENTH {
            if wr == Rank::SIXTH && sk < Rank::SIXTH && sp < Rank::SIXTH {
                return score / 64;
            }
            if wr <= Rank::SECOND && sp == Rank::SIXTH {
                return score / 64;
            }
        }

        if wk == Rank::EIGHTH && wr == Rank::EIGHTH {
            let edge_files = Bitboard::FILE_A
                | Bitboard::FILE_B
                | Bitboard::FILE_G
                | Bitboard::FILE_H;
            if edge_files.contains(pawn) {
                return score / 16;
            }
            if (sk.index() as Score + strong_tempo as Score) < Rank::SIXTH.index() as Score {
                return score / 16;
            }
        }

        return score / 2;
    }

    score
}

// --- Scaling functions ---

/// King + pawns vs king: rook-file pawns with the defender in the corner
/// reduce to the KPK result of the most advanced pawn.
fn scale_kpsk(board: &Board, strong: Color) -> i32 {
    let strong_pawns = board.pieces_bb(strong, PieceType::Pawn);

    if strong_pawns.is_empty() {
        return SCALE_DRAW;
    }

    let all_on_a = (strong_pawns & Bitboard::FILE_A) == strong_pawns;
    let all_on_h = (strong_pawns & Bitboard::FILE_H) == strong_pawns;

    if all_on_a || all_on_h {
        let mut strong_king = board.king_square(strong);
        let mut weak_king = board.king_square(strong.flip());
        let mut pawn = if strong == Color::White {
            strong_pawns.last_square()
        } else {
            strong_pawns.first_square()
        };
        let us = if board.side_to_move() == strong {
            Color::White
        } else {
            Color::Black
        };
        let flip_file = pawn.file() >= File::E;

        strong_king = normalize_square(strong, strong_king, flip_file);
        weak_king = normalize_square(strong, weak_king, flip_file);
        pawn = normalize_square(strong, pawn, flip_file);

        if !kpk_is_winning(weak_king, strong_king, pawn, us) {
            return SCALE_DRAW;
        }
    }

    SCALE_NORMAL
}

/// King + bishop + pawns vs king: the wrong-colored-bishop rook pawn draw.
fn scale_kbpsk(board: &Board, strong: Color) -> i32 {
    if board.pieces_bb(strong, PieceType::Bishop).is_empty() {
        return SCALE_NORMAL;
    }

    let strong_pawns = board.pieces_bb(strong, PieceType::Pawn);
    if strong_pawns.is_empty() {
        return SCALE_DRAW;
    }

    let weak = strong.flip();
    let bishop = board
        .piecetype_bb(PieceType::Bishop)
        .first_square()
        .relative(strong);
    let weak_king = board.king_square(weak).relative(strong);
    let bishop_is_dark = Bitboard::DARK_SQUARES.contains(bishop);
    let wrong_file = if bishop_is_dark {
        Bitboard::FILE_A
    } else {
        Bitboard::FILE_H
    };

    if (strong_pawns & wrong_file) == strong_pawns {
        let queening_square = if bishop_is_dark { Square::A8 } else { Square::H8 };
        let queening_distance = weak_king.distance(queening_square) as i32;

        if queening_distance < 2 {
            return SCALE_DRAW;
        }

        return SCALE_NORMAL * (queening_distance - 1) / queening_distance;
    }

    SCALE_NORMAL
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_draw_endgames_probe() {
        for fen in [
            "4k3/8/8/8/8/8/8/4K3 w - - 0 1",
            "4k3/8/8/8/8/8/8/3NK3 w - - 0 1",
            "4k3/8/8/8/8/8/8/3BK3 b - - 0 1",
            "3nk3/8/8/8/8/8/8/3BK3 w - - 0 1",
        ] {
            let board = Board::from_fen(fen, false).unwrap();
            let (score_fn, strong) = probe_score(&board).expect(fen);
            assert_eq!(score_fn(&board, strong), DRAW, "{fen}");
        }
    }

    #[test]
    fn test_kpk_probe_win_and_draw() {
        // Kd6/Pd5 vs Kd8, white to move: winning.
        let board = Board::from_fen("3k4/8/3K4/3P4/8/8/8/8 w - - 0 1", false).unwrap();
        let (score_fn, strong) = probe_score(&board).unwrap();
        assert!(score_fn(&board, strong) > VICTORY);

        // Rook pawn, defender in the corner: drawn.
        let board = Board::from_fen("k7/8/1K6/P7/8/8/8/8 b - - 0 1", false).unwrap();
        let (score_fn, strong) = probe_score(&board).unwrap();
        assert_eq!(score_fn(&board, strong), DRAW);
    }

    #[test]
    fn test_kqkr_is_winning_for_queen() {
        let board = Board::from_fen("4k3/8/8/8/8/8/8/Q3K3 w - - 0 1", false).unwrap();
        // KQvK is a KXK case, not in the table; use KQvKR.
        let board2 = Board::from_fen("4k3/4r3/8/8/8/8/8/Q3K3 w - - 0 1", false).unwrap();
        assert!(probe_score(&board).is_none());
        let (score_fn, strong) = probe_score(&board2).unwrap();
        assert!(score_fn(&board2, strong) > 500);
    }

    #[test]
    fn test_scale_wrong_bishop() {
        // Light-squared bishop with an h-pawn, defender on h8: drawn.
        let board = Board::from_fen("7k/8/8/8/8/7P/8/4KB2 w - - 0 1", false).unwrap();
        let scale_fn = probe_scale(&board).expect("KBPsK scale entry");
        assert_eq!(scale_fn(&board, Color::White), SCALE_DRAW);
    }

    #[test]
    fn test_scale_kpsk_normal_case() {
        // Central pawns never scale down through this entry.
        let board = Board::from_fen("4k3/8/8/8/8/4P3/8/4K3 w - - 0 1", false).unwrap();
        // KPvK has a scoring entry; the scale entry matches pawnless KvK.
        let scale_fn = probe_scale(&board).expect("KPsK scale entry");
        assert_eq!(scale_fn(&board, Color::White), SCALE_NORMAL);
    }
}
