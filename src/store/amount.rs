//! Fixed-point transfer amounts.
//!
//! Amounts are held as an integer count of minor units so that the canonical decimal string (the
//! form that is hashed and sent to the ledger) is stable across parse/format cycles.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Number of fractional digits carried by an [`Amount`].
pub const AMOUNT_DECIMALS: u32 = 2;

const MINOR_UNITS_PER_MAJOR: u128 = 10u128.pow(AMOUNT_DECIMALS);

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum AmountParseError {
	#[error("Amount is empty")]
	Empty,

	#[error("Amount must not be negative: {0}")]
	Negative(String),

	#[error("Amount has too many fractional digits: {0}")]
	TooPrecise(String),

	#[error("Amount is not a decimal number: {0}")]
	Invalid(String),

	#[error("Amount is too large: {0}")]
	Overflow(String),
}

/// A non-negative decimal amount with [`AMOUNT_DECIMALS`] fractional digits.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct Amount(u128);

impl Amount {
	pub const ZERO: Amount = Amount(0);

	pub fn from_minor_units(minor_units: u128) -> Self {
		Self(minor_units)
	}

	pub fn minor_units(&self) -> u128 {
		self.0
	}

	pub fn is_zero(&self) -> bool {
		self.0 == 0
	}

	pub fn checked_add(self, other: Amount) -> Option<Amount> {
		self.0.checked_add(other.0).map(Amount)
	}

	pub fn saturating_add(self, other: Amount) -> Amount {
		Amount(self.0.saturating_add(other.0))
	}
}

impl fmt::Display for Amount {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		write!(
			f,
			"{}.{:0width$}",
			self.0 / MINOR_UNITS_PER_MAJOR,
			self.0 % MINOR_UNITS_PER_MAJOR,
			width = AMOUNT_DECIMALS as usize
		)
	}
}

impl FromStr for Amount {
	type Err = AmountParseError;

	fn from_str(s: &str) -> Result<Self, Self::Err> {
		let trimmed = s.trim();
		if trimmed.is_empty() {
			return Err(AmountParseError::Empty);
		}
		if trimmed.starts_with('-') {
			return Err(AmountParseError::Negative(trimmed.to_string()));
		}

		let (whole, fraction) = match trimmed.split_once('.') {
			Some((whole, fraction)) => (whole, fraction),
			None => (trimmed, ""),
		};

		let all_digits = |part: &str| part.bytes().all(|b| b.is_ascii_digit());
		if whole.is_empty()
			|| !all_digits(whole)
			|| !all_digits(fraction)
			|| (trimmed.contains('.') && fraction.is_empty())
		{
			return Err(AmountParseError::Invalid(trimmed.to_string()));
		}
		if fraction.len() > AMOUNT_DECIMALS as usize {
			return Err(AmountParseError::TooPrecise(trimmed.to_string()));
		}

		let overflow = || AmountParseError::Overflow(trimmed.to_string());
		let whole_units: u128 = whole.parse().map_err(|_| overflow())?;
		let fraction_units: u128 = if fraction.is_empty() {
			0
		} else {
			let scale = 10u128.pow(AMOUNT_DECIMALS - fraction.len() as u32);
			fraction.parse::<u128>().map_err(|_| overflow())? * scale
		};

		whole_units
			.checked_mul(MINOR_UNITS_PER_MAJOR)
			.and_then(|units| units.checked_add(fraction_units))
			.map(Amount)
			.ok_or_else(overflow)
	}
}

impl TryFrom<String> for Amount {
	type Error = AmountParseError;

	fn try_from(value: String) -> Result<Self, Self::Error> {
		value.parse()
	}
}

impl From<Amount> for String {
	fn from(value: Amount) -> Self {
		value.to_string()
	}
}
