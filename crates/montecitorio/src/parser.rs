use std::collections::BTreeMap;
use std::sync::LazyLock;

use regex::Regex;
use scraper::{ElementRef, Html, Selector};

use crate::site::SiteConfig;
use crate::types::{ReferenceCode, SittingListing, VotationDetail, VotationListingEntry};
use crate::utils::YearMonth;

#[derive(Debug, thiserror::Error)]
pub enum ExtractionError {
    #[error("Missing expected element '{element}' in {url}")]
    MissingElement { url: String, element: &'static str },
    #[error("Text '{text}' in {url} does not match pattern '{pattern}'")]
    PatternMismatch {
        url: String,
        pattern: &'static str,
        text: String,
    },
    #[error("Invalid date '{text}' in {url}")]
    InvalidDate { url: String, text: String },
    #[error("Votation {key} is stored with reference {stored} but was scraped as {scraped}")]
    ReferenceMismatch {
        key: String,
        stored: ReferenceCode,
        scraped: ReferenceCode,
    },
}

/// Shape of one page of a sitting's votation listing.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ListingPage {
    NoVotations,
    Votations {
        votations: Vec<VotationListingEntry>,
        has_next: bool,
    },
}

const SITTING_PATTERN: &str = "<domain> n. <number> ... <day>";
const REFERENCE_PATTERN: &str = "RifVotazione=<sitting>_<votation>&tipo";
const TYPE_PATTERN: &str = "Votazione <type> n. ...";
const MEMBERS_ROW_PATTERN: &str = "<name> <vote> <> <name> <vote>";

static RE_SITTING: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^(.+?)\s+n\.\s*(\d+)\b.*?\b(\d{1,2})\s*$").expect("invalid regex: sitting")
});

static RE_REFERENCE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"RifVotazione=([^&]+)&tipo").expect("invalid regex: reference code")
});

static RE_VOTATION_TYPE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^Votazione\s+(.+?)\s+n\.").expect("invalid regex: votation type")
});

static SEL_SITTING: LazyLock<Selector> =
    LazyLock::new(|| Selector::parse("a.eleres_seduta").expect("invalid selector: sitting"));
static SEL_NOTICE: LazyLock<Selector> =
    LazyLock::new(|| Selector::parse("p.campo").expect("invalid selector: notice"));
static SEL_VOTATION: LazyLock<Selector> =
    LazyLock::new(|| Selector::parse("div.itemV a").expect("invalid selector: votation"));
static SEL_NEXT: LazyLock<Selector> =
    LazyLock::new(|| Selector::parse("a#Prossima").expect("invalid selector: next page"));
static SEL_TITLE: LazyLock<Selector> =
    LazyLock::new(|| Selector::parse("div#titolo").expect("invalid selector: title"));
static SEL_TYPE: LazyLock<Selector> =
    LazyLock::new(|| Selector::parse("div.verde12").expect("invalid selector: type"));
static SEL_OUTCOME: LazyLock<Selector> =
    LazyLock::new(|| Selector::parse("table.esito").expect("invalid selector: outcome"));
static SEL_MEMBERS: LazyLock<Selector> =
    LazyLock::new(|| Selector::parse("table.deputati").expect("invalid selector: members"));
static SEL_ROW: LazyLock<Selector> =
    LazyLock::new(|| Selector::parse("tr").expect("invalid selector: row"));
static SEL_CELL: LazyLock<Selector> =
    LazyLock::new(|| Selector::parse("td").expect("invalid selector: cell"));

fn elem_text(element: ElementRef) -> String {
    element.text().collect::<String>()
}

fn normalize_whitespace(text: &str) -> String {
    text.split_whitespace().collect::<Vec<_>>().join(" ")
}

/// First non-blank text node directly or indirectly under `element`.
fn first_text(element: ElementRef) -> Option<String> {
    element
        .text()
        .map(normalize_whitespace)
        .find(|t| !t.is_empty())
}

fn cells(row: ElementRef) -> Vec<String> {
    row.select(&SEL_CELL)
        .map(|td| normalize_whitespace(&elem_text(td)))
        .collect()
}

pub fn parse_sitting_list(
    document: &Html,
    url: &str,
    ym: YearMonth,
    site: &SiteConfig,
) -> Result<Vec<SittingListing>, ExtractionError> {
    let mut sittings = Vec::new();

    for anchor in document.select(&SEL_SITTING) {
        let text = normalize_whitespace(&elem_text(anchor));
        let caps = RE_SITTING
            .captures(&text)
            .ok_or_else(|| ExtractionError::PatternMismatch {
                url: url.to_string(),
                pattern: SITTING_PATTERN,
                text: text.clone(),
            })?;

        let number: u32 = caps[2]
            .parse()
            .map_err(|_| ExtractionError::PatternMismatch {
                url: url.to_string(),
                pattern: SITTING_PATTERN,
                text: text.clone(),
            })?;
        let day: u32 = caps[3]
            .parse()
            .map_err(|_| ExtractionError::InvalidDate {
                url: url.to_string(),
                text: text.clone(),
            })?;
        let date = ym.day(day).ok_or_else(|| ExtractionError::InvalidDate {
            url: url.to_string(),
            text: format!("{}-{:02}", ym, day),
        })?;

        log::debug!("Found {} sitting n. {} on {}", &caps[1], number, date);

        sittings.push(SittingListing {
            number,
            date,
            reference_url: site.sitting_reference_url(number),
        });
    }

    Ok(sittings)
}

pub fn parse_votation_listing(
    document: &Html,
    url: &str,
    site: &SiteConfig,
) -> Result<ListingPage, ExtractionError> {
    let no_votations = document
        .select(&SEL_NOTICE)
        .next()
        .is_some_and(|p| elem_text(p).to_lowercase().contains("attenzione"));
    if no_votations {
        return Ok(ListingPage::NoVotations);
    }

    let mut votations = Vec::new();
    for anchor in document.select(&SEL_VOTATION) {
        let href = anchor.value().attr("href").unwrap_or_default();
        let reference = RE_REFERENCE
            .captures(href)
            .and_then(|caps| caps[1].parse::<ReferenceCode>().ok())
            .ok_or_else(|| ExtractionError::PatternMismatch {
                url: url.to_string(),
                pattern: REFERENCE_PATTERN,
                text: href.to_string(),
            })?;

        votations.push(VotationListingEntry {
            reference,
            url: site.votation_href_url(href),
        });
    }

    if votations.is_empty() {
        return Err(ExtractionError::MissingElement {
            url: url.to_string(),
            element: "div.itemV a",
        });
    }

    let has_next = document.select(&SEL_NEXT).next().is_some();

    Ok(ListingPage::Votations {
        votations,
        has_next,
    })
}

pub fn parse_votation_detail(
    document: &Html,
    url: &str,
    reference: &ReferenceCode,
) -> Result<VotationDetail, ExtractionError> {
    let missing = |element: &'static str| ExtractionError::MissingElement {
        url: url.to_string(),
        element,
    };

    let title = document
        .select(&SEL_TITLE)
        .next()
        .map(|e| normalize_whitespace(&elem_text(e)))
        .filter(|s| !s.is_empty())
        .ok_or_else(|| missing("div#titolo"))?;

    let type_line = document
        .select(&SEL_TYPE)
        .next()
        .and_then(first_text)
        .ok_or_else(|| missing("div.verde12"))?;
    let kind = RE_VOTATION_TYPE
        .captures(&type_line)
        .map(|caps| caps[1].to_string())
        .ok_or_else(|| ExtractionError::PatternMismatch {
            url: url.to_string(),
            pattern: TYPE_PATTERN,
            text: type_line.clone(),
        })?;

    let outcome = document
        .select(&SEL_OUTCOME)
        .next()
        .ok_or_else(|| missing("table.esito"))?;
    let outcome_rows: Vec<ElementRef> = outcome.select(&SEL_ROW).collect();
    let Some((result_row, body)) = outcome_rows.split_last() else {
        return Err(missing("table.esito tr"));
    };
    if body.is_empty() {
        return Err(missing("table.esito header"));
    }

    let mut summary = BTreeMap::new();
    for row in &body[1..] {
        match cells(*row).as_slice() {
            [label, value] => {
                summary.insert(label.clone(), value.clone());
            }
            other => {
                return Err(ExtractionError::PatternMismatch {
                    url: url.to_string(),
                    pattern: "<label> <value>",
                    text: other.join(" | "),
                });
            }
        }
    }

    let result = result_row
        .select(&SEL_CELL)
        .next()
        .and_then(first_text)
        .ok_or_else(|| missing("table.esito result cell"))?;

    let members = document
        .select(&SEL_MEMBERS)
        .next()
        .ok_or_else(|| missing("table.deputati"))?;

    let mut member_votes = BTreeMap::new();
    for row in members.select(&SEL_ROW).skip(1) {
        let row_cells = cells(row);
        let [name, vote, _, other_name, other_vote] = row_cells.as_slice() else {
            return Err(ExtractionError::PatternMismatch {
                url: url.to_string(),
                pattern: MEMBERS_ROW_PATTERN,
                text: row_cells.join(" | "),
            });
        };
        // The last row leaves the second pair blank when the member count is odd.
        for (name, vote) in [(name, vote), (other_name, other_vote)] {
            if !name.is_empty() {
                member_votes.insert(name.clone(), vote.clone());
            }
        }
    }

    Ok(VotationDetail {
        number: reference.votation,
        title,
        kind,
        summary,
        result,
        member_votes,
    })
}
