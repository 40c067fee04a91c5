//! Clause memory encoder.
//!
//! Clause `i` lives on one word line of its tile. The first `HALF_CLS`
//! clauses fill rows downward from `TOP_CLS_START_WL`; the rest fill rows
//! upward from `BOT_CLS_START_WL`, mirroring the physical row order of the
//! array. Each variable owns two adjacent bit lines: the upper one marks
//! the variable as present in the clause, the lower one marks it negated.

use crate::bus::RegisterBus;
use crate::cnf::Literal;
use alloc::vec::Vec;
use log::trace;
use medusa_common::Tile;
use medusa_common::geometry::{
    BL_WORDS, BOT_CLS_START_WL, CLS_DISABLE_BIT, HALF_CLS, TOP_CLS_START_WL, VARS_PER_WORD,
    WL_WORDS,
};

/// Idle value of the first word-line word: top reset indicator deasserted.
pub const WL_FIRST_IDLE: u32 = 0x0000_0001;

/// Idle value of the last word-line word: bottom reset indicator deasserted.
pub const WL_LAST_IDLE: u32 = 0x8000_0000;

/// Word line holding clause `index`.
pub fn word_line(index: usize) -> usize {
    if index < HALF_CLS {
        TOP_CLS_START_WL + index
    } else {
        BOT_CLS_START_WL - (index - HALF_CLS)
    }
}

/// Inverse of `word_line` for rows inside the clause area.
pub fn clause_index(word_line: usize) -> Option<usize> {
    let top_end = TOP_CLS_START_WL + HALF_CLS;
    let bottom_end = BOT_CLS_START_WL + 1 - HALF_CLS;
    if (TOP_CLS_START_WL..top_end).contains(&word_line) {
        Some(word_line - TOP_CLS_START_WL)
    } else if (bottom_end..=BOT_CLS_START_WL).contains(&word_line) {
        Some(HALF_CLS + (BOT_CLS_START_WL - word_line))
    } else {
        None
    }
}

/// Bit-line word and bit of a literal's polarity line.
///
/// The presence line is the next bit up.
pub fn literal_position(literal: Literal) -> (usize, u32) {
    let var = literal.unsigned_abs() as usize - 1;
    let word = var / VARS_PER_WORD;
    let bit = 2 * (var % VARS_PER_WORD) as u32;
    (word, bit)
}

/// Value of word-line word `word` with optional line `bit` asserted.
///
/// The reset indicators in the first and last words stay deasserted.
pub fn word_line_value(word: usize, bit: Option<u32>) -> u32 {
    let mut value = bit.map(|b| 1u32 << b).unwrap_or(0);
    if word == 0 {
        value |= WL_FIRST_IDLE;
    }
    if word == WL_WORDS - 1 {
        value |= WL_LAST_IDLE;
    }
    value
}

/// Bit-line image of one clause row.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EncodedClause {
    /// Word line the row is latched by.
    pub word_line: usize,
    /// Bit-line words driven while the word line pulses.
    pub bit_lines: [u32; BL_WORDS],
    /// Words that must be written for this row.
    pub touched: [bool; BL_WORDS],
}

/// Encodes clause `index` of a tile.
///
/// The control word is always touched so the row's disconnect bit is
/// cleared even for an empty clause.
pub fn encode_clause(index: usize, clause: &[Literal]) -> EncodedClause {
    let mut bit_lines = [0u32; BL_WORDS];
    let mut touched = [false; BL_WORDS];
    touched[BL_WORDS - 1] = true;

    for &literal in clause {
        let (word, bit) = literal_position(literal);
        bit_lines[word] |= 1 << (bit + 1);
        if literal < 0 {
            bit_lines[word] |= 1 << bit;
        }
        touched[word] = true;
    }

    EncodedClause {
        word_line: word_line(index),
        bit_lines,
        touched,
    }
}

/// Recovers the literals of a programmed row.
///
/// Returns `None` when the row is disconnected.
pub fn decode_bit_lines(bit_lines: &[u32; BL_WORDS]) -> Option<Vec<Literal>> {
    if bit_lines[BL_WORDS - 1] & (1 << CLS_DISABLE_BIT) != 0 {
        return None;
    }
    let mut literals = Vec::new();
    for (word, &value) in bit_lines[..BL_WORDS - 1].iter().enumerate() {
        for slot in 0..VARS_PER_WORD {
            let bit = 2 * slot as u32;
            if value & (1 << (bit + 1)) != 0 {
                let var = (word * VARS_PER_WORD + slot + 1) as Literal;
                let negated = value & (1 << bit) != 0;
                literals.push(if negated { -var } else { var });
            }
        }
    }
    Some(literals)
}

/// Programs one clause row.
///
/// Bit lines are driven first, the word line is pulsed, and only after the
/// word line drops are the bit lines returned to zero.
pub fn program_clause<B: RegisterBus + ?Sized>(bus: &mut B, tile: Tile, clause: &EncodedClause) {
    let wl_word = clause.word_line / 32;
    let wl_bit = (clause.word_line % 32) as u32;

    for (word, &value) in clause.bit_lines.iter().enumerate() {
        if clause.touched[word] {
            bus.write_register(tile.bl_addr(word), value);
        }
    }

    bus.write_register(tile.wl_addr(wl_word), word_line_value(wl_word, Some(wl_bit)));
    bus.write_register(tile.wl_addr(wl_word), word_line_value(wl_word, None));

    for (word, _) in clause.bit_lines.iter().enumerate() {
        if clause.touched[word] {
            bus.write_register(tile.bl_addr(word), 0);
        }
    }
    trace!("{} row {} programmed", tile.name(), clause.word_line);
}
