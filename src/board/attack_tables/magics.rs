//! Magic bitboard generation for sliding piece attacks.
//!
//! Each square gets an edge-trimmed relevance mask; all blocker subsets are
//! enumerated with the carry-rippler trick, and a sparse 64-bit multiplier
//! is searched so that `(occ * magic) >> (64 - bits)` perfectly indexes a
//! compact attack table. Collisions are allowed when both subsets produce
//! the same attack set. On BMI2 targets the multiply is replaced by PEXT.

use once_cell::sync::Lazy;
use rand::prelude::*;

use crate::board::types::{Bitboard, Square};

/// Per-square indexing data into the shared flat attack table.
struct Magic {
    mask: Bitboard,
    magic: u64,
    shift: u32,
    offset: usize,
}

impl Magic {
    #[inline]
    fn index(&self, occupancy: Bitboard) -> usize {
        #[cfg(all(target_arch = "x86_64", target_feature = "bmi2"))]
        {
            let _ = (self.magic, self.shift);
            unsafe {
                self.offset + std::arch::x86_64::_pext_u64(occupancy.0, self.mask.0) as usize
            }
        }
        #[cfg(not(all(target_arch = "x86_64", target_feature = "bmi2")))]
        {
            self.offset
                + (((occupancy & self.mask).0.wrapping_mul(self.magic)) >> self.shift) as usize
        }
    }
}

struct MagicTable {
    magics: Vec<Magic>,
    attacks: Vec<Bitboard>,
}

impl MagicTable {
    #[inline]
    fn attacks(&self, square: Square, occupancy: Bitboard) -> Bitboard {
        self.attacks[self.magics[square.index()].index(occupancy)]
    }
}

const ROOK_DIRECTIONS: [(i8, i8); 4] = [(0, 1), (0, -1), (1, 0), (-1, 0)];
const BISHOP_DIRECTIONS: [(i8, i8); 4] = [(1, 1), (1, -1), (-1, 1), (-1, -1)];

/// Walks the four rays from a square, stopping at the first blocker in each
/// direction (the blocker square itself is included in the attack set).
fn slider_attacks_by_rays(
    square: Square,
    occupancy: Bitboard,
    directions: &[(i8, i8); 4],
) -> Bitboard {
    let mut attacks = Bitboard::EMPTY;
    for &(dr, df) in directions {
        let mut rank = square.rank().0 as i8 + dr;
        let mut file = square.file().0 as i8 + df;
        while (0..8).contains(&rank) && (0..8).contains(&file) {
            let target = Square((rank * 8 + file) as u8);
            attacks |= Bitboard::from_square(target);
            if occupancy.contains(target) {
                break;
            }
            rank += dr;
            file += df;
        }
    }
    attacks
}

/// The relevance mask: ray squares excluding the board edges in each ray
/// direction, since an edge blocker cannot change the attack set.
fn relevant_mask(square: Square, directions: &[(i8, i8); 4]) -> Bitboard {
    let mut mask = slider_attacks_by_rays(square, Bitboard::EMPTY, directions);
    if square.rank().0 != 0 {
        mask &= !Bitboard::RANK_1;
    }
    if square.rank().0 != 7 {
        mask &= !Bitboard::RANK_8;
    }
    if square.file().0 != 0 {
        mask &= !Bitboard::FILE_A;
    }
    if square.file().0 != 7 {
        mask &= !Bitboard::FILE_H;
    }
    mask
}

/// Sparse candidates keep the multiplier's popcount low, which is what makes
/// the perfect-hash search converge quickly.
fn random_sparse_u64(rng: &mut StdRng) -> u64 {
    rng.gen::<u64>() & rng.gen::<u64>() & rng.gen::<u64>()
}

/// Finds a multiplier mapping every blocker subset to a distinct slot,
/// except where the attack sets agree anyway.
fn find_magic(
    subsets: &[Bitboard],
    attacks: &[Bitboard],
    shift: u32,
    rng: &mut StdRng,
) -> u64 {
    let size = subsets.len();
    let mut table: Vec<Bitboard> = vec![Bitboard::EMPTY; size];
    let mut epoch: Vec<u32> = vec![0; size];
    let mut attempt = 0u32;

    loop {
        let magic = random_sparse_u64(rng);

        // Discard candidates that don't spread the high bits enough.
        if (subsets.last().unwrap().0.wrapping_mul(magic) >> 56).count_ones() < 6 {
            continue;
        }

        attempt += 1;
        let mut ok = true;

        for (i, &subset) in subsets.iter().enumerate() {
            let index = (subset.0.wrapping_mul(magic) >> shift) as usize;

            if epoch[index] < attempt {
                epoch[index] = attempt;
                table[index] = attacks[i];
            } else if table[index] != attacks[i] {
                ok = false;
                break;
            }
        }

        if ok {
            return magic;
        }
    }
}

fn build_magic_table(directions: &[(i8, i8); 4], seed: u64) -> MagicTable {
    let mut rng = StdRng::seed_from_u64(seed);
    let mut magics = Vec::with_capacity(64);
    let mut flat: Vec<Bitboard> = Vec::new();

    for square in Square::all() {
        let mask = relevant_mask(square, directions);
        let bits = mask.count();
        let shift = 64 - bits;
        let size = 1usize << bits;

        let mut subsets = Vec::with_capacity(size);
        let mut attacks = Vec::with_capacity(size);
        for occ in mask.subsets() {
            subsets.push(occ);
            attacks.push(slider_attacks_by_rays(square, occ, directions));
        }

        let magic = find_magic(&subsets, &attacks, shift, &mut rng);
        let offset = flat.len();
        flat.resize(offset + size, Bitboard::EMPTY);

        let entry = Magic {
            mask,
            magic,
            shift,
            offset,
        };
        for (i, &occ) in subsets.iter().enumerate() {
            flat[entry.index(occ)] = attacks[i];
        }
        magics.push(entry);
    }

    MagicTable {
        magics,
        attacks: flat,
    }
}

static ROOK_TABLE: Lazy<MagicTable> = Lazy::new(|| build_magic_table(&ROOK_DIRECTIONS, 0x5EED_0001));
static BISHOP_TABLE: Lazy<MagicTable> =
    Lazy::new(|| build_magic_table(&BISHOP_DIRECTIONS, 0x5EED_0002));

#[inline]
pub fn rook_attacks(square: Square, occupancy: Bitboard) -> Bitboard {
    ROOK_TABLE.attacks(square, occupancy)
}

#[inline]
pub fn bishop_attacks(square: Square, occupancy: Bitboard) -> Bitboard {
    BISHOP_TABLE.attacks(square, occupancy)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_rook_attacks_empty_board() {
        let attacks = rook_attacks(Square(28), Bitboard::EMPTY);
        let expected = (Bitboard::RANK_4 | Bitboard::file(crate::board::types::File::E))
            ^ Bitboard::from_square(Square(28));
        assert_eq!(attacks, expected);
    }

    #[test]
    fn test_rook_attacks_with_blockers() {
        // Rook on e4, blockers on e6 and c4.
        let blockers = Bitboard::from_square(Square(44)) | Bitboard::from_square(Square(26));
        let attacks = rook_attacks(Square(28), blockers);
        assert!(attacks.contains(Square(44))); // e6 capturable
        assert!(!attacks.contains(Square(52))); // e7 blocked
        assert!(attacks.contains(Square(26))); // c4 capturable
        assert!(!attacks.contains(Square(25))); // b4 blocked
    }

    #[test]
    fn test_bishop_attacks_with_blockers() {
        // Bishop on e4, blocker on g6.
        let blockers = Bitboard::from_square(Square(46));
        let attacks = bishop_attacks(Square(28), blockers);
        assert!(attacks.contains(Square(46)));
        assert!(!attacks.contains(Square(55)));
        assert!(attacks.contains(Square(7))); // h1 anti-diagonal
    }

    #[test]
    fn test_magic_matches_ray_walk() {
        for square in Square::all() {
            for occ in [
                Bitboard::EMPTY,
                Bitboard(0xFF00_FF00_FF00_FF00),
                Bitboard(0x00FF_00FF_00FF_00FF),
                Bitboard(0x1234_5678_9ABC_DEF0),
            ] {
                assert_eq!(
                    rook_attacks(square, occ),
                    slider_attacks_by_rays(square, occ, &ROOK_DIRECTIONS)
                );
                assert_eq!(
                    bishop_attacks(square, occ),
                    slider_attacks_by_rays(square, occ, &BISHOP_DIRECTIONS)
                );
            }
        }
    }
}
