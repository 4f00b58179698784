//! Zobrist hashing keys for incremental position hashes.
//!
//! All keys come from a fixed-seed PRNG so that hashes are reproducible
//! across runs and platforms.

use once_cell::sync::Lazy;
use rand::prelude::*;

use super::types::{CastlingRights, File, Move, Piece, PieceType, Square};

pub struct ZobristKeys {
    /// Indexed by packed piece then square; row 0 and 8 are unused padding
    /// so the packed piece value indexes directly.
    pub psq: [[u64; 64]; 16],
    /// Indexed by the 4-bit castling rights mask.
    pub castling: [u64; 16],
    /// Indexed by en-passant file.
    pub en_passant: [u64; 8],
    pub black_to_move: u64,
}

impl ZobristKeys {
    fn new() -> Self {
        // Fixed seed for reproducibility.
        let mut rng = StdRng::seed_from_u64(0x0BD0_7E57_1CC5_EEDC);
        let mut psq = [[0u64; 64]; 16];
        let mut castling = [0u64; 16];
        let mut en_passant = [0u64; 8];

        for piece in 0..16 {
            let piece_type = piece & 7;
            if piece_type == 0 || piece_type == 7 {
                continue;
            }
            for key in psq[piece].iter_mut() {
                *key = rng.gen();
            }
        }

        for key in castling.iter_mut().skip(1) {
            *key = rng.gen();
        }

        for key in en_passant.iter_mut() {
            *key = rng.gen();
        }

        ZobristKeys {
            psq,
            castling,
            en_passant,
            black_to_move: rng.gen(),
        }
    }

    #[inline]
    pub fn piece(&self, piece: Piece, square: Square) -> u64 {
        self.psq[piece.index()][square.index()]
    }

    #[inline]
    pub fn castling_rights(&self, rights: CastlingRights) -> u64 {
        self.castling[rights.index()]
    }

    #[inline]
    pub fn ep_file(&self, file: File) -> u64 {
        self.en_passant[file.index()]
    }
}

pub static ZOBRIST: Lazy<ZobristKeys> = Lazy::new(ZobristKeys::new);

const CYCLIC_SIZE: usize = 8192;

/// Hash table mapping the Zobrist delta of every reversible move to the
/// move itself, used for upcoming-repetition detection. Built with cuckoo
/// swap-insertion over two index functions.
pub struct CyclicTable {
    pub keys: Vec<u64>,
    pub moves: Vec<Move>,
}

#[inline]
pub fn cyclic_index_lo(key: u64) -> usize {
    (key & 0x1FFF) as usize
}

#[inline]
pub fn cyclic_index_hi(key: u64) -> usize {
    ((key >> 13) & 0x1FFF) as usize
}

pub static CYCLIC: Lazy<CyclicTable> = Lazy::new(|| {
    use super::attack_tables::attacks_bb;
    use super::types::{Bitboard, Color};

    let mut keys = vec![0u64; CYCLIC_SIZE];
    let mut moves = vec![Move::NONE; CYCLIC_SIZE];

    for piece_type in [
        PieceType::Knight,
        PieceType::Bishop,
        PieceType::Rook,
        PieceType::Queen,
        PieceType::King,
    ] {
        for color in Color::BOTH {
            let piece = Piece::new(color, piece_type);
            for from in Square::all() {
                for to in (from.0 + 1..64).map(Square) {
                    if !attacks_bb(piece_type, from, Bitboard::EMPTY).contains(to) {
                        continue;
                    }

                    let mut mv = Move::new(from, to);
                    let mut key = ZOBRIST.piece(piece, from)
                        ^ ZOBRIST.piece(piece, to)
                        ^ ZOBRIST.black_to_move;
                    let mut index = cyclic_index_lo(key);

                    // Swap the current pair with the slot contents until an
                    // empty slot is found.
                    loop {
                        std::mem::swap(&mut keys[index], &mut key);
                        std::mem::swap(&mut moves[index], &mut mv);

                        if mv.is_none() {
                            break;
                        }

                        // Alternate between the two index functions of the
                        // displaced key.
                        index ^= cyclic_index_lo(key) ^ cyclic_index_hi(key);
                    }
                }
            }
        }
    }

    CyclicTable { keys, moves }
});

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_keys_are_deterministic() {
        let a = ZobristKeys::new();
        assert_eq!(a.black_to_move, ZOBRIST.black_to_move);
        assert_eq!(a.psq[1][0], ZOBRIST.psq[1][0]);
    }

    #[test]
    fn test_unused_rows_are_zero() {
        assert_eq!(ZOBRIST.psq[0], [0u64; 64]);
        assert_eq!(ZOBRIST.psq[8][10], 0);
        assert_eq!(ZOBRIST.castling[0], 0);
    }

    #[test]
    fn test_cyclic_table_lookup() {
        // Every reversible knight move must be findable through one of the
        // two index functions.
        let piece = Piece::WHITE_KNIGHT;
        let from = Square(1); // b1
        let to = Square(18); // c3
        let key = ZOBRIST.piece(piece, from) ^ ZOBRIST.piece(piece, to) ^ ZOBRIST.black_to_move;
        let lo = cyclic_index_lo(key);
        let hi = cyclic_index_hi(key);
        assert!(CYCLIC.keys[lo] == key || CYCLIC.keys[hi] == key);
    }
}
