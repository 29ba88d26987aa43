//! Latin-square construction.
//!
//! Squares are `order x order` matrices over `0..order` where each symbol
//! appears exactly once in every row and every column.

use std::collections::HashSet;

use rand::seq::SliceRandom;
use rand::Rng;
use tracing::instrument;

use crate::domain::error::{DomainError, DomainResult};

pub type Square = Vec<Vec<usize>>;

/// Construct a Latin square by naive random row generation.
///
/// * `reduced` - row `i` starts with symbol `i` and the first row is `0..order`
/// * `uniform` - restart the whole square on any collision, which samples
///   uniformly but costs time exponential in `order`. Otherwise only the
///   offending row is redrawn.
/// * `shuffle` - permute rows, columns and symbols afterwards (adds some
///   randomness to a non-uniform square; pointless when `uniform`).
#[instrument(level = "debug", skip(rng))]
pub fn latin_square<R: Rng + ?Sized>(
    order: usize,
    reduced: bool,
    uniform: bool,
    shuffle: bool,
    rng: &mut R,
) -> Square {
    if order == 0 {
        return Vec::new();
    }

    let mut square: Square = Vec::new();
    while !is_latin_rectangle(&square) || square.len() < order {
        square.clear();
        if reduced {
            square.push((0..order).collect());
        }
        while square.len() < order {
            let reduced_row = reduced.then_some(square.len());
            square.push(new_row(order, reduced_row, rng));
            if is_latin_rectangle(&square) {
                continue;
            }
            if uniform {
                break;
            }
            while !is_latin_rectangle(&square) {
                let last = square.len() - 1;
                square[last] = new_row(order, reduced_row, rng);
            }
        }
    }

    if shuffle {
        shuffle_square(square, true, rng)
    } else {
        square
    }
}

/// Construct a row-balanced Latin square of even `order`.
///
/// Every ordered pair of distinct symbols appears back-to-back exactly once.
/// Starts from the canonical Williams square, then shuffles rows and relabels
/// symbols; columns are kept so balance is preserved.
#[instrument(level = "debug", skip(rng))]
pub fn balanced_latin_square<R: Rng + ?Sized>(order: usize, rng: &mut R) -> DomainResult<Square> {
    if order % 2 == 1 {
        return Err(DomainError::OddBalancedLatinSquare(order));
    }
    if order == 0 {
        return Ok(Vec::new());
    }

    let mut column_starts = vec![0, 1];
    let (mut low, mut high) = (2, order - 1);
    while column_starts.len() < order {
        column_starts.push(high);
        if column_starts.len() < order {
            column_starts.push(low);
        }
        high -= 1;
        low += 1;
    }

    let square = (0..order)
        .map(|row| {
            column_starts
                .iter()
                .map(|start| (start + row) % order)
                .collect()
        })
        .collect();

    Ok(shuffle_square(square, false, rng))
}

/// True when `rows` is non-empty and no symbol repeats in any row or column.
pub fn is_latin_rectangle(rows: &[Vec<usize>]) -> bool {
    if rows.is_empty() {
        return false;
    }
    let width = rows[0].len();
    if rows.iter().any(|row| row.len() != width) {
        return false;
    }
    let rows_ok = rows
        .iter()
        .all(|row| row.iter().collect::<HashSet<_>>().len() == width);
    let columns_ok = (0..width).all(|col| {
        rows.iter().map(|row| row[col]).collect::<HashSet<_>>().len() == rows.len()
    });
    rows_ok && columns_ok
}

fn new_row<R: Rng + ?Sized>(order: usize, reduced_row: Option<usize>, rng: &mut R) -> Vec<usize> {
    match reduced_row {
        Some(first) => {
            let mut rest: Vec<usize> = (0..order).filter(|&n| n != first).collect();
            rest.shuffle(rng);
            std::iter::once(first).chain(rest).collect()
        }
        None => {
            let mut row: Vec<usize> = (0..order).collect();
            row.shuffle(rng);
            row
        }
    }
}

fn shuffle_square<R: Rng + ?Sized>(mut square: Square, shuffle_columns: bool, rng: &mut R) -> Square {
    let order = square.len();
    square.shuffle(rng);

    if shuffle_columns {
        let mut columns: Vec<usize> = (0..order).collect();
        columns.shuffle(rng);
        square = square
            .into_iter()
            .map(|row| columns.iter().map(|&c| row[c]).collect())
            .collect();
    }

    let mut relabel: Vec<usize> = (0..order).collect();
    relabel.shuffle(rng);
    square
        .into_iter()
        .map(|row| row.into_iter().map(|symbol| relabel[symbol]).collect())
        .collect()
}
