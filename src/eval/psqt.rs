//! Piece-square tables.
//!
//! The pawn table covers the 48 squares a pawn can occupy; all other piece
//! tables exploit file symmetry and store 32 entries (queenside files, rank
//! major). White values are stored directly, black values negated and
//! vertically mirrored, so the board can keep a single running sum.

use once_cell::sync::Lazy;

use crate::board::types::{Color, Piece, PieceType, Scorepair, Square};
use crate::board::{PIECE_EG_VALUES, PIECE_MG_VALUES};

#[allow(non_snake_case)]
const fn S(mg: i16, eg: i16) -> Scorepair {
    Scorepair::new(mg, eg)
}

const Z: Scorepair = Scorepair::ZERO;

#[rustfmt::skip]
const PAWN_SQT: [Scorepair; 48] = [
    S(-43,  9), S(-22, 10), S(-45, 11), S(-28, -5), S(-34, 22), S( 11, 19), S( 22,  9), S(-27,-23),
    S(-38, -3), S(-46,  4), S(-19, -4), S(-23, -7), S(-13,  2), S(-32,  9), S(  4,-14), S(-22,-19),
    S(-34, 12), S(-35,  4), S(-17,-20), S(  0,-31), S(  4,-27), S( -3,-14), S(-16, -9), S(-27,-17),
    S(-19, 35), S(-30, 12), S(-12, -6), S(  3,-33), S( 11,-22), S( 31,-16), S( -9, -1), S(-13, 11),
    S( 10, 52), S(-14, 30), S(  8,  4), S( 24,-20), S( 46, -1), S(104, 16), S( 46, 27), S( 26, 38),
    S( 89, 11), S( 51,  4), S( 59, -4), S( 87,-32), S( 96,-18), S( 43, -2), S(-63, 22), S(-65, 26),
];

#[rustfmt::skip]
const KNIGHT_SQT: [Scorepair; 32] = [
    S( -54, -44), S( -13, -45), S(  -7, -21), S(   8,  -1),
    S(  -7, -26), S(   0,  -6), S(  10, -22), S(  18,  -3),
    S(  -1, -41), S(  14, -11), S(  29,  -8), S(  34,  24),
    S(  17,   4), S(  19,  22), S(  46,  29), S(  40,  49),
    S(  38,  19), S(  29,  19), S(  52,  31), S(  39,  53),
    S( -28,  12), S(  30,  11), S(  36,  31), S(  55,  32),
    S(  -7, -16), S( -37,   3), S(  40,  -6), S(  44,  20),
    S(-178, -75), S(-110,   6), S(-122,  10), S(  25,   3),
];

#[rustfmt::skip]
const BISHOP_SQT: [Scorepair; 32] = [
    S(  30, -47), S(  27, -21), S(  -6, -10), S(   5, -12),
    S(  40, -42), S(  47, -32), S(  39, -13), S(  16,   6),
    S(  29,  -8), S(  41,  -1), S(  24,  -8), S(  22,  35),
    S(  16, -27), S(  23,   9), S(  21,  29), S(  34,  42),
    S(   1,  -3), S(  18,  22), S(  26,  27), S(  26,  49),
    S(  43,   3), S(  16,  30), S(  21,   6), S(  40,  17),
    S( -65,  -3), S( -71, -12), S( -10,  15), S( -15,  10),
    S( -58, -21), S( -50,  11), S(-146,  12), S(-112,   6),
];

#[rustfmt::skip]
const ROOK_SQT: [Scorepair; 32] = [
    S(  -6, -36), S(  -4, -29), S(  -2, -18), S(   7, -29),
    S( -37, -31), S( -20, -33), S(  -4, -21), S(  -5, -23),
    S( -32, -22), S(  -6, -19), S( -25,  -7), S( -15,  -9),
    S( -26,  -6), S( -23,   5), S( -25,  10), S(  -3,  -1),
    S( -15,  16), S(   0,  23), S(  19,  17), S(  29,  10),
    S( -15,  29), S(  26,  19), S(  27,  21), S(  57,  14),
    S(  14,  30), S(  -6,  33), S(  42,  34), S(  51,  35),
    S(  24,  32), S(  27,  36), S(  15,  38), S(  21,  34),
];

#[rustfmt::skip]
const QUEEN_SQT: [Scorepair; 32] = [
    S(  12, -76), S(  -2, -84), S(  17,-104), S(  34, -88),
    S(  19, -68), S(  24, -74), S(  43, -71), S(  28, -26),
    S(  16, -45), S(  30, -22), S(  19,  19), S(  17,  10),
    S(  17,  -1), S(  29,  16), S(   5,  40), S(  -2,  65),
    S(  26,  10), S(  -3,  54), S(  10,  50), S( -12,  79),
    S(   9,  15), S(  -5,  45), S( -12,  74), S(  -4,  73),
    S( -15,  18), S( -53,  38), S( -16,  73), S( -30,  93),
    S( -37,  21), S( -19,  38), S( -15,  58), S( -15,  66),
];

#[rustfmt::skip]
const KING_SQT: [Scorepair; 32] = [
    S(  40,-119), S(  53, -59), S( -40, -45), S( -33, -63),
    S(  39, -51), S(   6, -18), S( -17,  -6), S( -49,  -1),
    S( -73, -45), S(   6, -16), S( -20,   9), S( -18,  21),
    S(-128, -34), S( -34,   1), S( -22,  28), S( -22,  40),
    S( -75,   0), S(  13,  46), S(  10,  58), S(  -9,  59),
    S( -29,  26), S(  55,  79), S(  47,  84), S(  38,  70),
    S( -40,  -8), S(  16,  70), S(  44,  73), S(  38,  58),
    S(  26,-238), S( 105, -26), S(  77,   6), S(  17,  18),
];

/// `PSQ[piece][square]`, signed from white's point of view.
static PSQ: Lazy<Box<[[Scorepair; 64]; 16]>> = Lazy::new(|| {
    let mut table = Box::new([[Z; 64]; 16]);

    // Pawns use the full 48-entry table.
    let pawn_value = S(PIECE_MG_VALUES[1], PIECE_EG_VALUES[1]);
    for square in Square::all() {
        let rank = square.rank().0;
        if rank == 0 || rank == 7 {
            continue;
        }
        let entry = pawn_value + PAWN_SQT[square.index() - 8];
        table[Piece::WHITE_PAWN.index()][square.index()] = entry;
        table[Piece::BLACK_PAWN.index()][square.flip_vertical().index()] = -entry;
    }

    // Other piece types use the file-folded 32-entry tables.
    for (piece_type, sqt) in [
        (PieceType::Knight, &KNIGHT_SQT),
        (PieceType::Bishop, &BISHOP_SQT),
        (PieceType::Rook, &ROOK_SQT),
        (PieceType::Queen, &QUEEN_SQT),
        (PieceType::King, &KING_SQT),
    ] {
        let white = Piece::new(Color::White, piece_type);
        let black = Piece::new(Color::Black, piece_type);
        let value = S(
            PIECE_MG_VALUES[piece_type.index()],
            PIECE_EG_VALUES[piece_type.index()],
        );

        for square in Square::all() {
            let entry = value + sqt[square.queenside_index()];
            table[white.index()][square.index()] = entry;
            table[black.index()][square.flip_vertical().index()] = -entry;
        }
    }

    table
});

/// The signed piece-square value of `piece` standing on `square`.
#[inline]
pub fn psq_score(piece: Piece, square: Square) -> Scorepair {
    PSQ[piece.index()][square.index()]
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_white_black_antisymmetry() {
        for square in Square::all() {
            for piece_type in PieceType::ALL {
                if piece_type == PieceType::Pawn
                    && (square.rank().0 == 0 || square.rank().0 == 7)
                {
                    continue;
                }
                let white = psq_score(Piece::new(Color::White, piece_type), square);
                let black =
                    psq_score(Piece::new(Color::Black, piece_type), square.flip_vertical());
                assert_eq!(white, -black, "{piece_type:?} {square}");
            }
        }
    }

    #[test]
    fn test_file_symmetry_for_pieces() {
        for square in Square::all() {
            let mirrored = Square(square.0 ^ 7);
            assert_eq!(
                psq_score(Piece::WHITE_KNIGHT, square),
                psq_score(Piece::WHITE_KNIGHT, mirrored)
            );
        }
    }

    #[test]
    fn test_piece_values_dominate() {
        // A queen in the corner is still worth far more than a pawn.
        let queen = psq_score(Piece::WHITE_QUEEN, Square::A1);
        let pawn = psq_score(Piece::WHITE_PAWN, Square(28));
        assert!(queen.midgame() > 2 * pawn.midgame());
    }
}
