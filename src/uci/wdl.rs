//! Win/draw/loss estimation and score normalization.
//!
//! Uses a logistic model fitted on self-play data, parameterized by the
//! total material count, following the Stockfish WDL-model methodology.

use crate::board::types::{Score, MATE_FOUND};

/// Internal-to-centipawn normalization constant: +100 normalized cp at
/// material count 58 corresponds to a 50% expected win rate.
const NORMALIZE_SCORE: i32 = 141;

pub struct WdlParams {
    mean: f64,
    spread: f64,
}

impl WdlParams {
    pub fn new(material: u32) -> WdlParams {
        const AS: [f64; 4] = [-115.80269028, 326.13955902, -411.17611305, 342.29869813];
        const BS: [f64; 4] = [-35.81090243, 83.17183837, -52.14133486, 81.73401953];

        // The fitted model covers material counts in [17, 78], anchored
        // at 58.
        let m = material.clamp(17, 78) as f64 / 58.0;

        WdlParams {
            mean: ((AS[0] * m + AS[1]) * m + AS[2]) * m + AS[3],
            spread: ((BS[0] * m + BS[1]) * m + BS[2]) * m + BS[3],
        }
    }

    /// Expected win rate for a score, in per mille.
    pub fn expected_winrate(&self, score: Score) -> u16 {
        (0.5 + 1000.0 / (1.0 + ((self.mean - score as f64) / self.spread).exp())) as u16
    }
}

/// A (win, draw, loss) triple in per mille units.
pub struct WdlValue {
    pub win: u16,
    pub draw: u16,
    pub loss: u16,
}

impl WdlValue {
    pub fn new(score: Score, material: u32) -> WdlValue {
        let params = WdlParams::new(material);
        let win = params.expected_winrate(score);
        let loss = params.expected_winrate(-score);
        WdlValue {
            win,
            draw: 1000 - win - loss,
            loss,
        }
    }
}

/// Rescales an internal score so 100 cp means a 50% win rate; mate scores
/// pass through untouched.
pub fn normalized_score(score: Score) -> Score {
    if score.abs() >= MATE_FOUND {
        score
    } else {
        (score as i32 * 100 / NORMALIZE_SCORE) as Score
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::board::types::MATE;

    #[test]
    fn test_normalization_fixpoints() {
        assert_eq!(normalized_score(0), 0);
        assert_eq!(normalized_score(141), 100);
        assert_eq!(normalized_score(-141), -100);
        assert_eq!(normalized_score(MATE - 3), MATE - 3);
    }

    #[test]
    fn test_wdl_symmetry() {
        let even = WdlValue::new(0, 58);
        assert_eq!(even.win, even.loss);
        assert!(even.draw > 0);

        let winning = WdlValue::new(300, 58);
        assert!(winning.win > winning.loss);
        assert_eq!(winning.win + winning.draw + winning.loss, 1000);
    }

    #[test]
    fn test_big_scores_saturate() {
        let crushing = WdlValue::new(2000, 40);
        assert!(crushing.win > 950);
    }
}
