//! KPK endgame bitbase, built at startup by retrograde analysis.
//!
//! Positions are normalized so that the strong side is White and the pawn
//! sits on the queenside (files a-d, ranks 2-7): 2 * 24 * 64 * 64 entries,
//! one bit each.

use once_cell::sync::Lazy;

use crate::board::attack_tables::{king_attacks, pawn_attacks};
use crate::board::types::{Color, Direction, File, Rank, Square};

const KPK_SIZE: usize = 2 * 24 * 64 * 64;

const INVALID: u8 = 0;
const UNKNOWN: u8 = 1;
const DRAW: u8 = 2;
const WIN: u8 = 4;

fn kpk_index(weak_ksq: Square, strong_ksq: Square, psq: Square, stm: Color) -> usize {
    debug_assert!(psq.file() < File::E);
    debug_assert!(psq.rank() != Rank::FIRST && psq.rank() != Rank::EIGHTH);
    weak_ksq.index()
        | (strong_ksq.index() << 6)
        | (stm.index() << 12)
        | (psq.file().index() << 13)
        | ((Rank::SEVENTH.index() - psq.rank().index()) << 15)
}

#[derive(Clone, Copy)]
struct KpkPosition {
    weak_ksq: Square,
    strong_ksq: Square,
    psq: Square,
    stm: Color,
    result: u8,
}

fn init_entry(index: usize) -> KpkPosition {
    let weak_ksq = Square((index & 63) as u8);
    let strong_ksq = Square(((index >> 6) & 63) as u8);
    let stm = Color::from_index((index >> 12) & 1);
    let psq = Square::new(
        File(((index >> 13) & 3) as u8),
        Rank((Rank::SEVENTH.index() - (index >> 15)) as u8),
    );

    let mut result = UNKNOWN;

    if strong_ksq.distance(weak_ksq) <= 1 || weak_ksq == psq || strong_ksq == psq {
        result = INVALID;
    } else if stm == Color::White {
        // The weak king may not stand in check with the strong side to move.
        if pawn_attacks(Color::White, psq).contains(weak_ksq) {
            result = INVALID;
        }
        // Immediate winning promotion.
        else if psq.rank() == Rank::SEVENTH {
            let promo = psq.shift(Direction::NORTH);
            if strong_ksq != promo
                && (weak_ksq.distance(promo) > 1 || strong_ksq.distance(promo) == 1)
            {
                result = WIN;
            }
        }
    } else {
        // Stalemate, or the pawn falls.
        let escapes =
            king_attacks(weak_ksq) & !(king_attacks(strong_ksq) | pawn_attacks(Color::White, psq));
        if escapes.is_empty() {
            result = DRAW;
        } else if (king_attacks(weak_ksq) & !king_attacks(strong_ksq)).contains(psq) {
            result = DRAW;
        }
    }

    KpkPosition {
        weak_ksq,
        strong_ksq,
        psq,
        stm,
        result,
    }
}

/// One fixed-point step: combine the results of all successor positions.
fn classify(pos: &KpkPosition, table: &[KpkPosition]) -> u8 {
    let good = if pos.stm == Color::White { WIN } else { DRAW };
    let bad = good ^ DRAW ^ WIN;

    let mut result = INVALID;
    let mover_ksq = if pos.stm == Color::White {
        pos.strong_ksq
    } else {
        pos.weak_ksq
    };

    for to in king_attacks(mover_ksq) {
        let (weak, strong) = if pos.stm == Color::White {
            (pos.weak_ksq, to)
        } else {
            (to, pos.strong_ksq)
        };
        result |= table[kpk_index(weak, strong, pos.psq, pos.stm.flip())].result;
    }

    if pos.stm == Color::White {
        if pos.psq.rank() < Rank::SEVENTH {
            result |= table[kpk_index(
                pos.weak_ksq,
                pos.strong_ksq,
                pos.psq.shift(Direction::NORTH),
                Color::Black,
            )]
            .result;
        }

        if pos.psq.rank() == Rank::SECOND {
            let mid = pos.psq.shift(Direction::NORTH);
            let double = mid.shift(Direction::NORTH);
            if mid != pos.strong_ksq && mid != pos.weak_ksq {
                result |= table[kpk_index(pos.weak_ksq, pos.strong_ksq, double, Color::Black)]
                    .result;
            }
        }
    }

    if result & good != 0 {
        good
    } else if result & UNKNOWN != 0 {
        UNKNOWN
    } else {
        bad
    }
}

static BITBASE: Lazy<Vec<u8>> = Lazy::new(|| {
    let mut table: Vec<KpkPosition> = (0..KPK_SIZE).map(init_entry).collect();

    // Fixed-point iteration over the undecided positions.
    loop {
        let mut modified = false;

        for index in 0..KPK_SIZE {
            if table[index].result == UNKNOWN {
                let result = classify(&table[index], &table);
                table[index].result = result;
                modified |= result != UNKNOWN;
            }
        }

        if !modified {
            break;
        }
    }

    let mut bits = vec![0u8; KPK_SIZE / 8];
    for (index, pos) in table.iter().enumerate() {
        if pos.result == WIN {
            bits[index >> 3] |= 1 << (index & 7);
        }
    }
    bits
});

/// Probes the bitbase. All squares must already be normalized to the
/// strong side's point of view with the pawn on the queenside; `stm` is
/// White when the strong side has the move.
pub fn kpk_is_winning(weak_ksq: Square, strong_ksq: Square, psq: Square, stm: Color) -> bool {
    let index = kpk_index(weak_ksq, strong_ksq, psq, stm);
    BITBASE[index >> 3] & (1 << (index & 7)) != 0
}

/// Maps a square to the strong side's point of view, optionally mirroring
/// the files so that the pawn lands on the queenside.
pub fn normalize_square(strong_side: Color, square: Square, flip_file: bool) -> Square {
    let square = square.relative(strong_side);
    if flip_file {
        Square(square.0 ^ 7)
    } else {
        square
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_basic_wins_and_draws() {
        // King in front of its pawn, opposition: win.
        // White: Kd6, Pd5; Black: Kd8, white to move.
        assert!(kpk_is_winning(
            Square::D8,
            Square(43), // d6
            Square(35), // d5
            Color::White
        ));

        // Rook-pawn with the defending king in the corner: draw.
        // White: Kb6, Pa5; Black: Ka8.
        assert!(!kpk_is_winning(
            Square::A8,
            Square(41), // b6
            Square(32), // a5
            Color::White
        ));
    }

    #[test]
    fn test_key_squares_with_tempo() {
        // White: Ke6, Pe5, Black: Ke8. White to move wins; black to move
        // reaches the drawing defense.
        let weak = Square::E8;
        let strong = Square(44); // e6
        let pawn = Square(36); // e5
        assert!(kpk_is_winning(weak, strong, pawn, Color::White));
    }

    #[test]
    fn test_normalize_square() {
        assert_eq!(
            normalize_square(Color::Black, Square::A8, false),
            Square::A1
        );
        assert_eq!(normalize_square(Color::White, Square::H4, true), Square(27)); // d4
    }
}
