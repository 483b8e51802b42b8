use std::collections::BTreeMap;
use std::{fmt::Display, str::FromStr};

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

#[derive(Debug, thiserror::Error)]
#[error("Invalid house '{0}'. Accepted values: 'C', 'camera', 'S', 'senato'")]
pub struct HouseParseError(String);

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum House {
    Camera,
    Senato,
}

impl House {
    /// Single-letter code used as the house component of identity keys.
    pub fn code(&self) -> &'static str {
        match self {
            House::Camera => "C",
            House::Senato => "S",
        }
    }
}

impl FromStr for House {
    type Err = HouseParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "c" | "camera" => Ok(House::Camera),
            "s" | "senato" => Ok(House::Senato),
            _ => Err(HouseParseError(s.to_string())),
        }
    }
}

impl Display for House {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            House::Camera => write!(f, "Camera dei Deputati"),
            House::Senato => write!(f, "Senato della Repubblica"),
        }
    }
}

#[derive(Debug, thiserror::Error)]
#[error("Invalid reference code '{0}'. Expected '<sittingNumber>_<votationNumber>'")]
pub struct ReferenceCodeError(String);

/// Compound external identifier of a votation, `"<sittingNumber>_<votationNumber>"`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct ReferenceCode {
    pub sitting: u32,
    pub votation: u32,
}

impl ReferenceCode {
    pub fn new(sitting: u32, votation: u32) -> Self {
        Self { sitting, votation }
    }
}

impl FromStr for ReferenceCode {
    type Err = ReferenceCodeError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let (sitting, votation) = s
            .split_once('_')
            .ok_or_else(|| ReferenceCodeError(s.to_string()))?;
        let parse = |part: &str| {
            if part.is_empty() || !part.chars().all(|c| c.is_ascii_digit()) {
                return Err(ReferenceCodeError(s.to_string()));
            }
            part.parse::<u32>()
                .map_err(|_| ReferenceCodeError(s.to_string()))
        };
        Ok(Self {
            sitting: parse(sitting)?,
            votation: parse(votation)?,
        })
    }
}

impl TryFrom<String> for ReferenceCode {
    type Error = ReferenceCodeError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

impl From<ReferenceCode> for String {
    fn from(value: ReferenceCode) -> Self {
        value.to_string()
    }
}

impl Display for ReferenceCode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}_{}", self.sitting, self.votation)
    }
}

/// A sitting as advertised on the monthly summary page.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SittingListing {
    pub number: u32,
    pub date: NaiveDate,
    pub reference_url: String,
}

impl Display for SittingListing {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "Seduta n. {} - {} ({})", self.number, self.date, self.reference_url)
    }
}

/// A votation anchor found on a sitting's paginated result listing.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct VotationListingEntry {
    pub reference: ReferenceCode,
    pub url: String,
}

impl Display for VotationListingEntry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{} - {}", self.reference, self.url)
    }
}

/// Outcome of walking a sitting's votation listing.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum VotationListing {
    /// The site reported that no votations were recorded in the sitting.
    NoVotations,
    Votations(Vec<VotationListingEntry>),
}

impl VotationListing {
    pub fn into_entries(self) -> Vec<VotationListingEntry> {
        match self {
            VotationListing::NoVotations => Vec::new(),
            VotationListing::Votations(entries) => entries,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct VotationDetail {
    pub number: u32,
    pub title: String,
    #[serde(rename = "type")]
    pub kind: String,
    pub summary: BTreeMap<String, String>,
    pub result: String,
    pub member_votes: BTreeMap<String, String>,
}

impl Display for VotationDetail {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        writeln!(f, "┌─ Votazione {} n. {}", self.kind, self.number)?;
        writeln!(f, "│  {}", self.title)?;
        for (label, value) in &self.summary {
            writeln!(f, "│  {:<28} {}", label, value)?;
        }
        writeln!(f, "│  Esito: {}", self.result)?;
        write!(f, "└─ {} member vote(s)", self.member_votes.len())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Votation {
    pub reference: ReferenceCode,
    pub url: String,
    pub detail: VotationDetail,
}

/// A sitting with every votation and its detail attached, as produced by a full read.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Sitting {
    pub number: u32,
    pub date: NaiveDate,
    pub reference_url: String,
    pub votations: Vec<Votation>,
}

impl Sitting {
    pub fn from_listing(listing: SittingListing, votations: Vec<Votation>) -> Self {
        Self {
            number: listing.number,
            date: listing.date,
            reference_url: listing.reference_url,
            votations,
        }
    }
}

impl Display for Sitting {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        writeln!(f, "┌─ Seduta n. {} ─ {}", self.number, self.date)?;
        writeln!(f, "│  {}", self.reference_url)?;
        writeln!(f, "└─ {} votation(s)", self.votations.len())?;
        for votation in &self.votations {
            writeln!(
                f,
                "   {:>8}  {} [{}]",
                votation.reference.to_string(),
                votation.detail.title,
                votation.detail.result
            )?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_reference_code_components() {
        let reference: ReferenceCode = "181_7".parse().expect("Should parse reference code");
        assert_eq!(reference.sitting, 181);
        assert_eq!(reference.votation, 7);
        assert_eq!(reference.to_string(), "181_7");
    }

    #[test]
    fn test_reference_code_rejects_malformed() {
        for bad in ["181", "181_", "_7", "181-7", "a_7", "181_7_2", ""] {
            assert!(
                bad.parse::<ReferenceCode>().is_err(),
                "'{}' should not parse",
                bad
            );
        }
    }

    #[test]
    fn test_reference_code_serializes_as_string() {
        let reference = ReferenceCode::new(152, 15);
        let json = serde_json::to_string(&reference).unwrap();
        assert_eq!(json, "\"152_15\"");
        let back: ReferenceCode = serde_json::from_str(&json).unwrap();
        assert_eq!(back, reference);
    }

    #[test]
    fn test_house_from_str() {
        assert_eq!("C".parse::<House>().unwrap(), House::Camera);
        assert_eq!("camera".parse::<House>().unwrap(), House::Camera);
        assert_eq!("s".parse::<House>().unwrap(), House::Senato);
        assert!("x".parse::<House>().is_err());
    }

    #[test]
    fn test_votation_detail_type_field_name() {
        let detail = VotationDetail {
            number: 7,
            title: "Mozione".to_string(),
            kind: "nominale".to_string(),
            summary: BTreeMap::new(),
            result: "Approvato".to_string(),
            member_votes: BTreeMap::new(),
        };
        let value = serde_json::to_value(&detail).unwrap();
        assert_eq!(value["type"], "nominale");
    }
}
