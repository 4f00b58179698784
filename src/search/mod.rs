//! The search kernel: iterative deepening, aspiration windows, multi-PV,
//! and a negamax alpha-beta with transposition-table cutoffs, null-move
//! and probcut pruning, singular extensions, late-move reductions and a
//! quiescence tail.

pub mod history;
pub mod picker;
pub mod worker;

use once_cell::sync::Lazy;

use crate::board::types::{
    mate_in, mated_in, Color, Move, PieceType, Score, INF_SCORE, MATE_FOUND, MAX_PLIES, NO_SCORE,
    VICTORY,
};
use crate::board::PIECE_EG_VALUES;
use crate::tt::{score_from_tt, score_to_tt, Bound};

use history::history_bonus;
use picker::MovePicker;
use worker::sort_root_moves;

pub use worker::{RootMove, Worker};

/// Search-stack length: `MAX_PLIES` plus four plies of history look-back
/// and two of killer look-ahead.
pub const MAX_STACK: usize = 256;

/// Limits and modifiers parsed from a `go` command.
#[derive(Clone, Debug, Default)]
pub struct SearchParams {
    pub wtime: Option<u64>,
    pub btime: Option<u64>,
    pub winc: Option<u64>,
    pub binc: Option<u64>,
    pub movestogo: Option<u32>,
    pub depth: Option<u16>,
    pub nodes: Option<u64>,
    pub mate: Option<u16>,
    pub movetime: Option<u64>,
    pub perft: Option<u32>,
    pub infinite: bool,
    pub ponder: bool,
    pub searchmoves: Vec<Move>,
}

impl SearchParams {
    pub fn time_for(&self, color: Color) -> Option<u64> {
        match color {
            Color::White => self.wtime,
            Color::Black => self.btime,
        }
    }

    pub fn inc_for(&self, color: Color) -> Option<u64> {
        match color {
            Color::White => self.winc,
            Color::Black => self.binc,
        }
    }

    /// Whether any limit besides depth/infinite drives the clock.
    pub fn has_time_controls(&self) -> bool {
        self.wtime.is_some() || self.btime.is_some() || self.movetime.is_some()
    }
}

/// Log-scaled base reductions, separate curves for quiet and noisy moves.
static REDUCTIONS: Lazy<[[i32; 256]; 2]> = Lazy::new(|| {
    let mut table = [[0i32; 256]; 2];
    for i in 1..256 {
        let ln = (i as f64).ln();
        table[0][i] = (ln * 10.81 + 4.15) as i32;
        table[1][i] = (ln * 20.76 + 10.69) as i32;
    }
    table
});

fn lmr_base_value(depth: i32, move_count: i32, improving: bool, is_quiet: bool) -> i32 {
    let curve = &REDUCTIONS[is_quiet as usize];
    let depth = (depth as usize).min(255);
    let move_count = (move_count as usize).min(255);
    (-415 + curve[depth] * curve[move_count] + (!improving as i32) * 538) / 1024
}

/// Late-move-pruning movecount limit.
fn lmp_threshold(depth: i32, improving: bool) -> i32 {
    if improving {
        4 + depth * depth
    } else {
        (4 + depth * depth) / 2
    }
}

impl Worker {
    /// Continuation-history score of a move over the 1/2/4-ply tables.
    fn conthist_score(&self, ss: usize, mv: Move) -> i32 {
        let piece = self.board.piece_on(mv.from());
        let to = mv.to();
        let mut score = 0;

        for offset in [1usize, 2, 4] {
            if let Some((prev_piece, prev_to)) = self.stack[ss - offset].cont_index {
                score += self
                    .continuation_hist
                    .table(prev_piece, prev_to)
                    .score(piece, to);
            }
        }

        score
    }

    fn history_score(&self, ss: usize, mv: Move) -> i32 {
        let piece = self.board.piece_on(mv.from());
        self.butterfly_hist.score(piece, mv) + self.conthist_score(ss, mv)
    }

    fn update_continuation_histories(
        &mut self,
        ss: usize,
        depth: i32,
        piece: crate::board::types::Piece,
        to: crate::board::types::Square,
        fail_high: bool,
    ) {
        let mut bonus = history_bonus(depth);
        if !fail_high {
            bonus = -bonus;
        }

        for offset in [1usize, 2, 4] {
            if let Some((prev_piece, prev_to)) = self.stack[ss - offset].cont_index {
                self.continuation_hist
                    .table_mut(prev_piece, prev_to)
                    .update(piece, to, bonus);
            }
        }
    }

    /// Rewards the cutoff move and punishes the quiets searched before it;
    /// also refreshes the killer and countermove slots.
    fn update_quiet_history(&mut self, ss: usize, depth: i32, bestmove: Move, quiets: &[Move]) {
        let bonus = history_bonus(depth);
        let piece = self.board.piece_on(bestmove.from());
        let to = bestmove.to();

        if let Some((last_piece, last_to)) = self.stack[ss - 1].cont_index {
            self.counter_hist.set(last_piece, last_to, bestmove);
        }

        self.butterfly_hist.update(piece, bestmove, bonus);
        self.update_continuation_histories(ss, depth, piece, to, true);

        if self.stack[ss].killer != bestmove {
            self.stack[ss].killer = bestmove;
        }

        for &quiet in quiets {
            let piece = self.board.piece_on(quiet.from());
            self.butterfly_hist.update(piece, quiet, -bonus);
            self.update_continuation_histories(ss, depth, piece, quiet.to(), false);
        }
    }

    fn update_single_capture(&mut self, mv: Move, bonus: i32) {
        let piece = self.board.piece_on(mv.from());
        let to = mv.to();
        let captured = match mv.kind() {
            crate::board::types::MoveKind::Promotion => mv.promotion_type(),
            crate::board::types::MoveKind::EnPassant => PieceType::Pawn,
            _ => self.board.piece_on(to).piece_type(),
        };
        self.capture_hist.update(piece, to, captured, bonus);
    }

    fn update_capture_history(&mut self, depth: i32, bestmove: Move, captures: &[Move]) {
        let bonus = history_bonus(depth);

        if self.board.move_is_noisy(bestmove)
            || bestmove.kind() == crate::board::types::MoveKind::Promotion
        {
            self.update_single_capture(bestmove, bonus);
        }

        for &capture in captures {
            self.update_single_capture(capture, -bonus);
        }
    }

    /// Static eval with the correction-history adjustment folded in.
    fn corrected_eval(&self, raw: Score) -> Score {
        let corrected = raw as i32 + self.correction_hist.correction(&self.board) as i32;
        corrected.clamp(-(MATE_FOUND as i32) + 1, MATE_FOUND as i32 - 1) as Score
    }

    fn update_pv(&mut self, ss: usize, mv: Move) {
        let child = std::mem::take(&mut self.stack[ss + 1].pv);
        let line = &mut self.stack[ss].pv;
        line.clear();
        line.push(mv);
        line.extend_from_slice(&child);
        self.stack[ss + 1].pv = child;
    }

    /// The main alpha-beta search. `ss` indexes the search stack at
    /// `plies + 4`.
    #[allow(clippy::too_many_lines)]
    pub fn search(
        &mut self,
        pv_node: bool,
        mut depth: i32,
        mut alpha: Score,
        mut beta: Score,
        ss: usize,
        cut_node: bool,
    ) -> Score {
        let root_node = self.stack[ss].plies == 0;
        let plies = self.stack[ss].plies.max(0) as usize;

        // A move cycle in the last few plies means this position can be
        // steered into a repetition, which bounds the score at a draw.
        if !root_node
            && self.board.stack().rule50 >= 3
            && alpha < 0
            && self.board.game_has_cycle(plies)
        {
            alpha = self.draw_score();
            if alpha >= beta {
                return alpha;
            }
        }

        if depth <= 0 {
            return self.qsearch(pv_node, alpha, beta, ss);
        }

        self.check_time();

        if pv_node && self.seldepth < plies as u16 + 1 {
            self.seldepth = plies as u16 + 1;
        }

        if !root_node
            && (self.shared.is_stopped() || self.board.game_is_drawn(plies))
        {
            return self.draw_score();
        }

        if plies >= MAX_PLIES {
            return if !self.board.in_check() {
                let raw = crate::eval::evaluate(&self.board, &mut self.king_pawn_table);
                self.corrected_eval(raw)
            } else {
                self.draw_score()
            };
        }

        if !root_node {
            // Mate distance pruning.
            alpha = alpha.max(mated_in(plies));
            beta = beta.min(mate_in(plies + 1));
            if alpha >= beta {
                return alpha;
            }
        }

        let in_check = self.board.in_check();
        let excluded = self.stack[ss].excluded_move;

        // Probing with the excluded move folded into the key isolates
        // singular-search results from the main line's entries.
        let key = self.board.stack().board_key ^ ((excluded.0 as u64) << 16);
        let (slot, found, tt_data) = self.shared.tt.probe(key);

        let mut tt_move = if found { tt_data.mv } else { Move::NONE };
        let tt_score = if found {
            score_from_tt(tt_data.score, plies)
        } else {
            NO_SCORE
        };
        let tt_bound = if found { tt_data.bound } else { Bound::None };
        let tt_depth = if found { tt_data.depth } else { 0 };

        if found && tt_depth >= depth && !pv_node {
            let cutoff = (tt_bound.is_lower() && tt_score >= beta)
                || (tt_bound.is_upper() && tt_score <= alpha);

            if cutoff && tt_score != NO_SCORE {
                if tt_bound.is_lower()
                    && !tt_move.is_none()
                    && !self.board.move_is_noisy(tt_move)
                    && tt_move.kind() != crate::board::types::MoveKind::Promotion
                {
                    self.update_quiet_history(ss, depth, tt_move, &[]);
                }
                return tt_score;
            }
        }

        let tt_noisy = !tt_move.is_none() && self.board.move_is_noisy(tt_move);

        self.stack[ss + 2].killer = Move::NONE;
        self.stack[ss].double_extensions = self.stack[ss - 1].double_extensions;

        let mut eval;
        let improving;

        if in_check {
            // No usable static eval while in check; skip early pruning.
            eval = NO_SCORE;
            self.stack[ss].static_eval = NO_SCORE;
            improving = false;
        } else {
            if found && tt_data.eval != NO_SCORE {
                self.stack[ss].static_eval = self.corrected_eval(tt_data.eval);
                eval = self.stack[ss].static_eval;
            } else {
                let raw = crate::eval::evaluate(&self.board, &mut self.king_pawn_table);
                self.stack[ss].static_eval = self.corrected_eval(raw);
                eval = self.stack[ss].static_eval;

                // Save the eval so other workers skip the recomputation.
                if !found {
                    self.shared
                        .tt
                        .save(slot, key, NO_SCORE, raw, 0, Bound::None, Move::NONE);
                }
            }

            // The TT score is usually a tighter estimate than the eval.
            if found && tt_score != NO_SCORE {
                let applicable = if tt_score > eval {
                    tt_bound.is_lower()
                } else {
                    tt_bound.is_upper()
                };
                if applicable {
                    eval = tt_score;
                }
            }

            if root_node && self.pv_line > 0 {
                tt_move = self.root_moves[self.pv_line].mv;
            }

            // Razoring: with a hopeless eval at the frontier, only a
            // tactic can save us.
            if !pv_node && depth == 1 && self.stack[ss].static_eval + 135 <= alpha {
                return self.qsearch(false, alpha, beta, ss);
            }

            improving =
                plies >= 2 && self.stack[ss].static_eval > self.stack[ss - 2].static_eval;

            // Futility pruning: a comfortable margin above beta at low
            // depth is unlikely to be lost.
            if !pv_node
                && depth <= 8
                && eval != NO_SCORE
                && eval as i32 - 85 * depth as i32 + 73 * improving as i32 >= beta as i32
                && eval < VICTORY
            {
                return eval;
            }

            // Null move pruning.
            if !pv_node
                && depth >= 3
                && plies as i16 >= self.nmp_verif_plies
                && excluded.is_none()
                && eval >= beta
                && eval >= self.stack[ss].static_eval
                && self.board.stack().material[self.board.side_to_move().index()] > 0
            {
                let r = (792 + 67 * depth) / 256 + ((eval as i32 - beta as i32) / 109).min(5);

                self.stack[ss].current_move = Move::NULL;
                self.stack[ss].cont_index = None;

                self.board.do_null_move();
                self.increment_nodes();
                let score = -self.search(false, depth - r, -beta, -beta + 1, ss + 1, !cut_node);
                self.board.undo_null_move();

                if score >= beta {
                    // Mate and win claims from a passed move can hide
                    // zugzwang; cap the claim at beta.
                    let score = if score > MATE_FOUND { beta } else { score };

                    if self.nmp_verif_plies != 0 || (depth <= 12 && beta.abs() < VICTORY) {
                        return score;
                    }

                    // Verification search with null moves disabled for a
                    // few plies.
                    self.nmp_verif_plies = plies as i16 + (depth - r) as i16 * 3 / 4;
                    let verif = self.search(false, depth - r, beta - 1, beta, ss, false);
                    self.nmp_verif_plies = 0;

                    if verif >= beta {
                        return score;
                    }
                }
            }

            // Probcut: a capture clearing beta by a solid margin in a
            // reduced search almost always holds at full depth.
            let probcut_beta = beta.saturating_add(140).min(INF_SCORE);

            if !root_node
                && depth >= 6
                && beta.abs() < VICTORY
                && !(found && tt_depth >= depth - 4 && tt_score != NO_SCORE && tt_score < probcut_beta)
            {
                let probcut_see = probcut_beta - self.stack[ss].static_eval;
                let probcut_tt_move = if !tt_move.is_none()
                    && self.board.see_above(tt_move, probcut_see)
                {
                    tt_move
                } else {
                    Move::NONE
                };

                let mut picker = MovePicker::new(
                    &self.board,
                    self,
                    true,
                    probcut_tt_move,
                    Move::NONE,
                    self.stack[ss - 1].cont_index,
                    [self.stack[ss - 1].cont_index, self.stack[ss - 2].cont_index],
                );

                loop {
                    let mv = picker.next(&self.board, self, false, probcut_see);
                    if mv.is_none() || picker.in_bad_noisy_stage() {
                        break;
                    }

                    if !self.board.move_is_legal(mv) || mv == excluded {
                        continue;
                    }

                    self.stack[ss].current_move = mv;
                    self.stack[ss].cont_index =
                        Some((self.board.piece_on(mv.from()), mv.to()));

                    let gives_check = self.board.move_gives_check(mv);
                    self.board.do_move_gc(mv, gives_check);
                    self.increment_nodes();

                    let mut score =
                        -self.qsearch(false, -probcut_beta, -probcut_beta + 1, ss + 1);

                    if score >= probcut_beta {
                        score = -self.search(
                            false,
                            depth - 4,
                            -probcut_beta,
                            -probcut_beta + 1,
                            ss + 1,
                            !cut_node,
                        );
                    }

                    self.board.undo_move(mv);

                    if score >= probcut_beta {
                        self.shared.tt.save(
                            slot,
                            key,
                            score_to_tt(score, plies),
                            self.stack[ss].static_eval,
                            depth - 3,
                            Bound::Lower,
                            mv,
                        );
                        return score;
                    }
                }
            }

            // Internal iterative reduction for TT misses.
            if !root_node && !found && depth >= 3 {
                depth -= 1;
            }
        }

        // Main move loop.
        let mut picker = MovePicker::new(
            &self.board,
            self,
            false,
            tt_move,
            self.stack[ss].killer,
            self.stack[ss - 1].cont_index,
            [self.stack[ss - 1].cont_index, self.stack[ss - 2].cont_index],
        );

        let mut best_score = -INF_SCORE;
        let mut best_move = Move::NONE;
        let mut move_count = 0i32;
        let mut quiets_tried: Vec<Move> = Vec::new();
        let mut captures_tried: Vec<Move> = Vec::new();
        let mut skip_quiets = false;

        loop {
            let mv = picker.next(&self.board, self, skip_quiets, 0);
            if mv.is_none() {
                break;
            }

            if root_node {
                // Only walk the root moves this PV line still owns.
                if !self.root_moves[self.pv_line..].iter().any(|rm| rm.mv == mv) {
                    continue;
                }
            } else if !self.board.move_is_legal(mv) || mv == excluded {
                continue;
            }

            move_count += 1;

            let is_quiet = !self.board.move_is_noisy(mv)
                && mv.kind() != crate::board::types::MoveKind::Promotion;

            if !root_node && best_score > -MATE_FOUND {
                // Late move pruning.
                if depth <= 8 && move_count > lmp_threshold(depth, improving) {
                    skip_quiets = true;
                }

                // Futility pruning on quiets.
                if depth <= 7
                    && !in_check
                    && is_quiet
                    && eval != NO_SCORE
                    && eval as i32 + 186 + 67 * depth as i32 <= alpha as i32
                {
                    skip_quiets = true;
                }

                // Continuation-history pruning.
                if depth <= 4 && self.conthist_score(ss, mv) < 842 - 5678 * (depth - 1) {
                    continue;
                }

                // SEE pruning.
                if depth <= 12 {
                    let threshold = if is_quiet {
                        -49 * depth
                    } else {
                        -22 * depth * depth
                    };
                    if !self.board.see_above(mv, threshold.max(i16::MIN as i32) as Score) {
                        continue;
                    }
                }
            }

            if root_node && self.is_main() {
                if let Some(tm) = &self.timeman {
                    if tm.elapsed_ms() > 3000 {
                        crate::uci::report::print_currmove(
                            &self.board,
                            depth,
                            mv,
                            move_count + self.pv_line as i32,
                        );
                    }
                }
            }

            let gives_check = self.board.move_gives_check(mv);
            let hist_score = if is_quiet { self.history_score(ss, mv) } else { 0 };
            let mut extension = 0i32;
            let new_depth = depth - 1;

            if !root_node
                && (plies as i32) < 2 * self.root_depth as i32
                && 2 * self.stack[ss].double_extensions < self.root_depth as i16
            {
                // Singular extension: is the TT move clearly better than
                // every alternative?
                if depth >= 8
                    && mv == tt_move
                    && excluded.is_none()
                    && tt_bound.is_lower()
                    && tt_score != NO_SCORE
                    && tt_score.abs() < VICTORY
                    && tt_depth >= depth - 3
                {
                    let singular_beta = tt_score - (11 * depth / 16) as Score;
                    let singular_depth = depth / 2 + 1;

                    self.stack[ss].excluded_move = tt_move;
                    let singular_score = self.search(
                        false,
                        singular_depth,
                        singular_beta - 1,
                        singular_beta,
                        ss,
                        cut_node,
                    );
                    self.stack[ss].excluded_move = Move::NONE;

                    if singular_score < singular_beta {
                        if !pv_node
                            && singular_beta - singular_score > 17
                            && self.stack[ss].double_extensions <= 9
                        {
                            extension = 2;
                            self.stack[ss].double_extensions += 1;
                        } else {
                            extension = 1;
                        }
                    } else if singular_beta >= beta {
                        // Multicut: several moves beat beta here.
                        return singular_beta;
                    }
                } else if gives_check {
                    extension = 1;
                }
            }

            let moved_piece = self.board.piece_on(mv.from());

            self.stack[ss].current_move = mv;
            self.stack[ss].cont_index = Some((moved_piece, mv.to()));

            self.board.do_move_gc(mv, gives_check);
            self.increment_nodes();

            let mut score = -NO_SCORE;

            // Late move reductions.
            if depth >= 3 && move_count > 1 + 3 * pv_node as i32 {
                let mut r = lmr_base_value(depth, move_count, improving, is_quiet);

                r += !pv_node as i32;
                r += cut_node as i32;
                r += tt_noisy as i32;

                // Refutation moves and capture escapes deserve more trust.
                r -= (mv == picker.killer || mv == picker.counter) as i32;
                r -= (is_quiet && !self.board.see_above(mv.reverse(), 0)) as i32;

                r -= (hist_score / 12614).clamp(-3, 3);

                let r = r.clamp(0, new_depth - 1);

                score = -self.search(false, new_depth - r, -alpha - 1, -alpha, ss + 1, true);

                if r != 0 && score > alpha {
                    score = -self.search(
                        false,
                        new_depth + extension,
                        -alpha - 1,
                        -alpha,
                        ss + 1,
                        !cut_node,
                    );
                    self.update_continuation_histories(
                        ss,
                        depth,
                        moved_piece,
                        mv.to(),
                        score > alpha,
                    );
                }
            } else if !pv_node || move_count != 1 {
                score = -self.search(
                    false,
                    new_depth + extension,
                    -alpha - 1,
                    -alpha,
                    ss + 1,
                    !cut_node,
                );
            }

            // Full-window search for the first PV move and for fail-highs.
            if pv_node && (move_count == 1 || score > alpha) {
                self.stack[ss + 1].pv.clear();
                score = -self.search(
                    true,
                    new_depth + extension,
                    -beta,
                    -alpha,
                    ss + 1,
                    false,
                );
            }

            self.board.undo_move(mv);

            if self.shared.is_stopped() {
                return 0;
            }

            if root_node {
                let seldepth = self.seldepth;
                let child_pv = self.stack[ss + 1].pv.clone();
                if let Some(root_move) = self.root_moves[self.pv_line..]
                    .iter_mut()
                    .find(|rm| rm.mv == mv)
                {
                    if move_count == 1 || score > alpha {
                        root_move.score = score;
                        root_move.seldepth = seldepth;
                        root_move.pv.clear();
                        root_move.pv.push(mv);
                        root_move.pv.extend_from_slice(&child_pv);
                    } else {
                        root_move.score = -INF_SCORE;
                    }
                }
            }

            if best_score < score {
                best_score = score;

                if alpha < best_score {
                    best_move = mv;
                    alpha = best_score;

                    if pv_node && !root_node {
                        self.update_pv(ss, mv);
                    }

                    if alpha >= beta {
                        if is_quiet {
                            self.update_quiet_history(ss, depth, best_move, &quiets_tried);
                        }
                        if move_count != 1 {
                            self.update_capture_history(depth, best_move, &captures_tried);
                        }
                        break;
                    }
                }
            }

            // Remember failing moves for the history penalties.
            if is_quiet {
                if quiets_tried.len() < 64 {
                    quiets_tried.push(mv);
                }
            } else if captures_tried.len() < 64 {
                captures_tried.push(mv);
            }
        }

        // Checkmate or stalemate. Singular searches must not hand out mate
        // or draw scores for a position that still has its excluded move.
        if move_count == 0 {
            best_score = if !excluded.is_none() {
                alpha
            } else if in_check {
                mated_in(plies)
            } else {
                0
            };
        }

        // Fold the eval error of this node into the correction history.
        if !in_check
            && excluded.is_none()
            && self.stack[ss].static_eval != NO_SCORE
            && best_score.abs() < MATE_FOUND
            && (best_move.is_none() || !self.board.move_is_noisy(best_move))
            && !(best_score >= beta && best_score <= self.stack[ss].static_eval)
            && !(best_move.is_none() && best_score >= self.stack[ss].static_eval)
        {
            let diff = best_score as i32 - self.stack[ss].static_eval as i32;
            self.correction_hist.update(&self.board, depth, diff);
        }

        if !root_node || self.pv_line == 0 {
            let bound = if best_score >= beta {
                Bound::Lower
            } else if pv_node && !best_move.is_none() {
                Bound::Exact
            } else {
                Bound::Upper
            };

            self.shared.tt.save(
                slot,
                key,
                score_to_tt(best_score, plies),
                self.stack[ss].static_eval,
                depth,
                bound,
                best_move,
            );
        }

        best_score
    }

    /// Quiescence search: captures (and evasions when in check) only.
    pub fn qsearch(&mut self, pv_node: bool, mut alpha: Score, mut beta: Score, ss: usize) -> Score {
        let plies = self.stack[ss].plies.max(0) as usize;
        let old_alpha = alpha;

        self.check_time();

        if pv_node && self.seldepth < plies as u16 + 1 {
            self.seldepth = plies as u16 + 1;
        }

        if self.shared.is_stopped() || self.board.game_is_drawn(plies) {
            return self.draw_score();
        }

        if plies >= MAX_PLIES {
            return if !self.board.in_check() {
                let raw = crate::eval::evaluate(&self.board, &mut self.king_pawn_table);
                self.corrected_eval(raw)
            } else {
                self.draw_score()
            };
        }

        // Mate distance pruning.
        alpha = alpha.max(mated_in(plies));
        beta = beta.min(mate_in(plies + 1));
        if alpha >= beta {
            return alpha;
        }

        let key = self.board.stack().board_key;
        let (slot, found, tt_data) = self.shared.tt.probe(key);
        let tt_score = if found {
            score_from_tt(tt_data.score, plies)
        } else {
            NO_SCORE
        };
        let tt_bound = if found { tt_data.bound } else { Bound::None };

        if !pv_node
            && found
            && tt_score != NO_SCORE
            && ((tt_bound.is_lower() && tt_score >= beta)
                || (tt_bound.is_upper() && tt_score <= alpha))
        {
            return tt_score;
        }

        let in_check = self.board.in_check();
        let eval;
        let mut best_score;

        if in_check {
            eval = NO_SCORE;
            best_score = -INF_SCORE;
        } else {
            if found && tt_data.eval != NO_SCORE {
                eval = tt_data.eval;
                best_score = self.corrected_eval(eval);
            } else {
                eval = crate::eval::evaluate(&self.board, &mut self.king_pawn_table);
                best_score = self.corrected_eval(eval);
            }

            // The TT score refines the stand-pat value.
            if found && tt_score != NO_SCORE {
                let applicable = if tt_score > best_score {
                    tt_bound.is_lower()
                } else {
                    tt_bound.is_upper()
                };
                if applicable {
                    best_score = tt_score;
                }
            }

            // Stand pat.
            alpha = alpha.max(best_score);
            if alpha >= beta {
                if !found {
                    self.shared.tt.save(
                        slot,
                        key,
                        score_to_tt(best_score, plies),
                        eval,
                        0,
                        Bound::Lower,
                        Move::NONE,
                    );
                }
                return alpha;
            }
        }

        let tt_move = if found { tt_data.mv } else { Move::NONE };

        let mut picker = MovePicker::new(
            &self.board,
            self,
            true,
            tt_move,
            Move::NONE,
            self.stack[ss - 1].cont_index,
            [self.stack[ss - 1].cont_index, self.stack[ss - 2].cont_index],
        );

        let mut best_move = Move::NONE;
        let mut move_count = 0;

        // Delta pruning baseline.
        let can_futility_prune = !in_check && self.board.occupancy_bb().count() >= 5;
        let futility_base = if best_score == -INF_SCORE {
            -INF_SCORE
        } else {
            best_score.saturating_add(110)
        };

        loop {
            let mv = picker.next(&self.board, self, false, 0);
            if mv.is_none() {
                break;
            }

            // Losing captures can't rescue a standing position.
            if best_score > -MATE_FOUND && picker.in_bad_noisy_stage() {
                break;
            }

            if !self.board.move_is_legal(mv) {
                continue;
            }

            move_count += 1;

            let gives_check = self.board.move_gives_check(mv);

            if best_score > -MATE_FOUND
                && can_futility_prune
                && !gives_check
                && mv.kind() == crate::board::types::MoveKind::Normal
            {
                let captured = self.board.piece_on(mv.to()).piece_type();
                let delta =
                    futility_base.saturating_add(PIECE_EG_VALUES[captured.index()]);

                // Too far below alpha even after winning the piece.
                if delta < alpha {
                    continue;
                }

                // Far behind: only look at material-winning captures.
                if futility_base < alpha && !self.board.see_above(mv, 1) {
                    continue;
                }
            }

            self.stack[ss].current_move = mv;
            self.stack[ss].cont_index = Some((self.board.piece_on(mv.from()), mv.to()));

            if pv_node {
                self.stack[ss + 1].pv.clear();
            }

            self.board.do_move_gc(mv, gives_check);
            self.increment_nodes();

            let score = -self.qsearch(pv_node, -beta, -alpha, ss + 1);
            self.board.undo_move(mv);

            if self.shared.is_stopped() {
                return 0;
            }

            if best_score < score {
                best_score = score;

                if alpha < best_score {
                    alpha = best_score;
                    best_move = mv;

                    if pv_node {
                        self.update_pv(ss, mv);
                    }

                    if alpha >= beta {
                        break;
                    }
                }
            }
        }

        // Checkmate; stalemates cannot be detected here since quiet moves
        // were never generated.
        if move_count == 0 && in_check {
            best_score = mated_in(plies);
        }

        let bound = if best_score >= beta {
            Bound::Lower
        } else if best_score <= old_alpha {
            Bound::Upper
        } else {
            Bound::Exact
        };

        self.shared.tt.save(
            slot,
            key,
            score_to_tt(best_score, plies),
            eval,
            0,
            bound,
            best_move,
        );

        best_score
    }

    /// One full iteration at `depth`: every multi-PV line with its
    /// aspiration loop.
    pub fn do_search_iteration(&mut self, mut depth: i32, multi_pv: usize) {
        for pv_line in 0..multi_pv {
            self.pv_line = pv_line;
            self.seldepth = 0;

            let prev_score = self.root_moves[pv_line].previous_score;
            let mut delta: Score;
            let mut alpha: Score;
            let mut beta: Score;

            // Shallow scores are too volatile to aspire around.
            if depth <= 8 {
                delta = 0;
                alpha = -INF_SCORE;
                beta = INF_SCORE;
            } else {
                delta = 8 + prev_score.abs() / 82;
                alpha = (-INF_SCORE).max(prev_score - delta);
                beta = INF_SCORE.min(prev_score + delta);
            }

            loop {
                self.search(true, depth, alpha, beta, 4, false);

                sort_root_moves(&mut self.root_moves[pv_line..]);
                let pv_score = self.root_moves[pv_line].score;

                // Abort counts as exact so the loop always terminates.
                let bound = if self.shared.is_stopped() {
                    Bound::Exact
                } else if pv_score >= beta {
                    Bound::Lower
                } else if pv_score <= alpha {
                    Bound::Upper
                } else {
                    Bound::Exact
                };

                if bound == Bound::Exact {
                    sort_root_moves(&mut self.root_moves[..multi_pv]);
                }

                if self.is_main() {
                    let elapsed = self
                        .timeman
                        .as_ref()
                        .map(|tm| tm.elapsed_ms())
                        .unwrap_or(0);
                    let late_info = elapsed > 3000;
                    let single_pv = multi_pv == 1;
                    let iter_completed = pv_line == multi_pv - 1;

                    if (late_info && single_pv)
                        || (bound == Bound::Exact && (late_info || iter_completed))
                    {
                        self.print_pv_lines(multi_pv, bound, elapsed);
                    }
                }

                match bound {
                    Bound::Exact => break,
                    Bound::Upper => {
                        depth = self.root_depth as i32;
                        beta = ((alpha as i32 + beta as i32) / 2) as Score;
                        alpha = (-INF_SCORE).max(pv_score.saturating_sub(delta));
                    }
                    _ => {
                        if depth - 1 > (self.root_depth as i32 - 1) / 2 {
                            depth -= 1;
                        }
                        beta = INF_SCORE.min(pv_score.saturating_add(delta));
                    }
                }

                delta = ((delta as i32 + delta as i32 * 79 / 256).min(INF_SCORE as i32)) as Score;
            }

            if self.shared.is_stopped() {
                break;
            }
        }
    }

    fn print_pv_lines(&self, multi_pv: usize, bound: Bound, elapsed_ms: u64) {
        let total_nodes = self.total_nodes();
        let hashfull = self.shared.tt.hashfull();

        for (index, root_move) in self.root_moves.iter().take(multi_pv).enumerate() {
            crate::uci::report::print_pv(
                &self.board,
                root_move,
                index + 1,
                self.root_depth,
                elapsed_ms,
                bound,
                total_nodes,
                hashfull,
                &self.options,
            );
        }
    }

    /// Iterative deepening driver, run by every worker.
    pub fn worker_search(&mut self) {
        let multi_pv = (self.options.multi_pv as usize).min(self.root_moves.len());
        // A zero or missing depth limit means "search as deep as allowed".
        let max_depth = self
            .params
            .depth
            .filter(|&depth| depth > 0)
            .unwrap_or(MAX_PLIES as u16)
            .min(MAX_PLIES as u16);

        self.root_depth = 1;
        while self.root_depth <= max_depth {
            self.do_search_iteration(self.root_depth as i32, multi_pv);

            for root_move in &mut self.root_moves {
                root_move.previous_score = root_move.score;
                root_move.score = -INF_SCORE;
            }

            if self.shared.is_stopped() {
                break;
            }

            if self.is_main() {
                let bestmove = self.root_moves[0].mv;
                let best_score = self.root_moves[0].previous_score;
                if let Some(tm) = &mut self.timeman {
                    tm.update(&self.board, bestmove, best_score);
                    if tm.can_stop_search() {
                        break;
                    }
                }

                // Optionally manage the iteration budget by nodes instead
                // of wall time, for reproducible fixed-node testing.
                if self.options.timeman_for_nodes {
                    if let Some(node_limit) = self.params.nodes {
                        if self.total_nodes() >= node_limit {
                            break;
                        }
                    }
                }

                // Stop early once a requested mate has been found.
                if let Some(mate) = self.params.mate {
                    if best_score >= mate_in(0) - 2 * mate as Score {
                        break;
                    }
                }
            } else if self.root_depth == max_depth {
                // Auxiliary workers keep searching at the last depth until
                // the main worker calls the search off.
                self.root_depth -= 1;
            }

            self.root_depth += 1;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::board::Board;

    fn search_position(fen: &str, depth: u16) -> (Move, Score) {
        let mut worker = Worker::standalone();
        let board = Board::from_fen(fen, false).unwrap();
        let params = SearchParams {
            depth: Some(depth),
            ..SearchParams::default()
        };
        worker.init_search_data(&board, &params);
        worker.worker_search();
        (
            worker.root_moves[0].mv,
            worker.root_moves[0].previous_score,
        )
    }

    #[test]
    fn test_finds_mate_in_one() {
        let (mv, score) = search_position("6k1/8/6K1/8/8/8/8/6R1 w - - 0 1", 3);
        let board = Board::from_fen("6k1/8/6K1/8/8/8/8/6R1 w - - 0 1", false).unwrap();
        assert_eq!(board.move_to_uci(mv), "g1g8");
        assert_eq!(score, mate_in(1));
    }

    #[test]
    fn test_finds_obvious_capture() {
        // A queen hangs on d5.
        let (mv, _) = search_position(
            "rnb1kbnr/ppp1pppp/8/3q4/4P3/8/PPPP1PPP/RNBQKBNR w KQkq - 0 3",
            4,
        );
        let board = Board::from_fen(
            "rnb1kbnr/ppp1pppp/8/3q4/4P3/8/PPPP1PPP/RNBQKBNR w KQkq - 0 3",
            false,
        )
        .unwrap();
        assert_eq!(board.move_to_uci(mv), "e4d5");
    }

    #[test]
    fn test_threefold_scores_near_zero() {
        let mut worker = Worker::standalone();
        let mut board = Board::startpos();
        for text in [
            "g1f3", "g8f6", "f3g1", "f6g8", "g1f3", "g8f6", "f3g1", "f6g8",
        ] {
            let mv = board.uci_to_move(text);
            board.do_move(mv);
        }
        let params = SearchParams {
            depth: Some(2),
            ..SearchParams::default()
        };
        worker.init_search_data(&board, &params);
        worker.worker_search();
        assert!(worker.root_moves[0].previous_score.abs() <= 1);
    }

    #[test]
    fn test_search_respects_depth_limit() {
        let (_, score) = search_position(Board::STARTPOS, 2);
        assert!(score.abs() < 200);
    }

    #[test]
    fn test_lmp_threshold_shape() {
        assert_eq!(lmp_threshold(1, true), 5);
        assert_eq!(lmp_threshold(1, false), 2);
        assert!(lmp_threshold(8, true) > lmp_threshold(4, true));
    }
}
