//! Parsers for RBN (Reverse Beacon Network) spot lines.
//!
//! Two parsers implement the same [`SpotParser`] contract:
//!
//! - [`TokenParser`] splits on whitespace and reads fields by position.
//!   This is the parser the pipeline uses.
//! - [`GrammarParser`] walks the line with `nom` combinators. It accepts the
//!   same shape of line and is kept for cross-checking and benchmarking.
//!
//! # Spot Format
//!
//! RBN spots have twelve whitespace-separated tokens:
//! ```text
//! DX de SPOTTER:  FREQ  CALLSIGN  MODE  SNR dB  WPM WPM  TYPE  TIMEZ
//! ```
//!
//! Example:
//! ```text
//! DX de EA5WU-#:    7018.3  RW1M           CW    19 dB  18 WPM  CQ      2259Z
//! ```

use nom::{
    IResult, Parser,
    bytes::complete::{tag_no_case, take_while1},
    character::complete::{char, digit1, multispace1, space0, space1},
    combinator::{map_res, opt, recognize, value},
    sequence::terminated,
};
use thiserror::Error;

use crate::spot::{Mode, Spot, SpotType};

/// Number of whitespace-separated tokens in a spot line.
pub const SPOT_TOKEN_COUNT: usize = 12;

/// Errors that can occur during parsing.
#[derive(Debug, Error, PartialEq)]
pub enum ParseError {
    #[error("Expected {expected} tokens, found {found}")]
    TokenCount { expected: usize, found: usize },

    #[error("Invalid frequency: {0}")]
    InvalidFrequency(String),

    #[error("Invalid SNR: {0}")]
    InvalidSnr(String),

    #[error("Invalid WPM: {0}")]
    InvalidWpm(String),

    #[error("Invalid spot format: {0}")]
    InvalidFormat(String),
}

/// Result type for parsing operations.
pub type ParseResult<T> = Result<T, ParseError>;

/// Converts one raw feed line into a [`Spot`].
pub trait SpotParser {
    fn parse(&self, line: &str) -> ParseResult<Spot>;
}

/// Fixed-position whitespace tokenizer.
#[derive(Debug, Clone, Copy, Default)]
pub struct TokenParser;

impl SpotParser for TokenParser {
    fn parse(&self, line: &str) -> ParseResult<Spot> {
        parse_spot(line)
    }
}

/// `nom` grammar over the same line shape.
#[derive(Debug, Clone, Copy, Default)]
pub struct GrammarParser;

impl SpotParser for GrammarParser {
    fn parse(&self, line: &str) -> ParseResult<Spot> {
        parse_spot_grammar(line)
    }
}

/// Strip the skimmer suffix from a spotter token.
///
/// `W1AW-#:` and `KM3T-2-#:` become `W1AW` and `KM3T`.
pub fn base_spotter(token: &str) -> &str {
    let token = token.trim_end_matches(':');
    token.split('-').next().unwrap_or(token)
}

/// Parse a spot line by whitespace token position.
///
/// # Example
///
/// ```
/// use rbn_filter::parser::parse_spot;
///
/// let line = "DX de EA5WU-#:    7018.3  RW1M           CW    19 dB  18 WPM  CQ      2259Z";
/// let spot = parse_spot(line).unwrap();
/// assert_eq!(spot.de_call, "EA5WU");
/// assert_eq!(spot.dx_call, "RW1M");
/// ```
pub fn parse_spot(line: &str) -> ParseResult<Spot> {
    let tokens: Vec<&str> = line.split_whitespace().collect();
    if tokens.len() != SPOT_TOKEN_COUNT {
        return Err(ParseError::TokenCount {
            expected: SPOT_TOKEN_COUNT,
            found: tokens.len(),
        });
    }

    let frequency_khz: f64 = tokens[3]
        .parse()
        .map_err(|_| ParseError::InvalidFrequency(tokens[3].to_string()))?;
    if !frequency_khz.is_finite() {
        return Err(ParseError::InvalidFrequency(tokens[3].to_string()));
    }
    let snr_db: i32 = tokens[6]
        .parse()
        .map_err(|_| ParseError::InvalidSnr(tokens[6].to_string()))?;
    let wpm: u16 = tokens[8]
        .parse()
        .map_err(|_| ParseError::InvalidWpm(tokens[8].to_string()))?;

    Ok(Spot {
        de_call: base_spotter(tokens[2]).to_string(),
        frequency_khz,
        dx_call: tokens[4].to_string(),
        mode: Mode::from_token(tokens[5]),
        snr_db,
        wpm,
        spot_type: SpotType::from_token(tokens[10]),
        timestamp: tokens[SPOT_TOKEN_COUNT - 1].to_string(),
    })
}

/// Check if a character is valid in a callsign.
///
/// Valid callsign characters are alphanumeric plus `/` for portable designators
/// and `-` for suffixes like `-#` on RBN spotters.
fn is_callsign_char(c: char) -> bool {
    c.is_ascii_alphanumeric() || c == '/' || c == '-' || c == '#'
}

/// Parse the "DX de " prefix that starts every spot line.
fn parse_dx_de_prefix(input: &str) -> IResult<&str, ()> {
    value(
        (),
        (
            tag_no_case("DX"),
            multispace1,
            tag_no_case("de"),
            multispace1,
        ),
    )
    .parse(input)
}

/// Parse a callsign (spotter or DX station).
fn parse_callsign(input: &str) -> IResult<&str, &str> {
    take_while1(is_callsign_char).parse(input)
}

/// Parse the spotter callsign followed by a colon.
fn parse_spotter(input: &str) -> IResult<&str, &str> {
    terminated(parse_callsign, (char(':'), space0)).parse(input)
}

/// Parse a floating-point frequency in kHz.
fn parse_frequency(input: &str) -> IResult<&str, f64> {
    map_res(recognize((digit1, opt((char('.'), digit1)))), |s: &str| {
        s.parse::<f64>()
    })
    .parse(input)
}

fn parse_word(input: &str) -> IResult<&str, &str> {
    take_while1(|c: char| c.is_ascii_alphanumeric()).parse(input)
}

/// Parse the signal-to-noise ratio (e.g., "19 dB" or "-5 dB").
fn parse_snr(input: &str) -> IResult<&str, i32> {
    terminated(
        map_res(recognize((opt(char('-')), digit1)), |s: &str| {
            s.parse::<i32>()
        }),
        (space1, tag_no_case("dB")),
    )
    .parse(input)
}

/// Parse the CW speed in WPM (e.g., "18 WPM").
fn parse_wpm(input: &str) -> IResult<&str, u16> {
    terminated(
        map_res(digit1, |s: &str| s.parse::<u16>()),
        (space1, tag_no_case("WPM")),
    )
    .parse(input)
}

/// Every field of a spot line after the `DX de` prefix.
fn spot_fields(input: &str) -> IResult<&str, Spot> {
    let (input, _) = parse_dx_de_prefix(input)?;
    let (input, spotter) = parse_spotter(input)?;
    let (input, _) = space0(input)?;
    let (input, frequency_khz) = parse_frequency(input)?;
    let (input, _) = space1(input)?;
    let (input, dx_call) = parse_callsign(input)?;
    let (input, _) = space1(input)?;
    let (input, mode) = parse_word(input)?;
    let (input, _) = space1(input)?;
    let (input, snr_db) = parse_snr(input)?;
    let (input, _) = space1(input)?;
    let (input, wpm) = parse_wpm(input)?;
    let (input, _) = space1(input)?;
    let (input, spot_type) = parse_word(input)?;
    let (input, _) = space1(input)?;
    let (input, timestamp) = parse_word(input)?;

    Ok((
        input,
        Spot {
            de_call: base_spotter(spotter).to_string(),
            frequency_khz,
            dx_call: dx_call.to_string(),
            mode: Mode::from_token(mode),
            snr_db,
            wpm,
            spot_type: SpotType::from_token(spot_type),
            timestamp: timestamp.to_string(),
        },
    ))
}

/// Parse a spot line with the `nom` grammar.
pub fn parse_spot_grammar(input: &str) -> ParseResult<Spot> {
    match spot_fields(input.trim()) {
        Ok(("", spot)) => Ok(spot),
        Ok((rest, _)) => Err(ParseError::InvalidFormat(format!(
            "trailing input: {:?}",
            rest
        ))),
        Err(e) => Err(ParseError::InvalidFormat(format!("{:?}", e))),
    }
}

/// Check if a line looks like a spot (quick pre-filter).
#[inline]
pub fn looks_like_spot(line: &str) -> bool {
    let trimmed = line.trim_start();
    trimmed.len() > 20 && trimmed.get(..6).is_some_and(|p| p.eq_ignore_ascii_case("DX de "))
}
