use chrono::{Datelike, NaiveDate};

use crate::types::{House, ReferenceCode};
use crate::utils::YearMonth;

pub const CAMERA_BASE_URL: &str = "http://www.camera.it";
pub const CAMERA_DOCUMENTS_URL: &str = "http://documenti.camera.it/votazioni/votazionitutte";
pub const DEFAULT_LEGISLATURE: u32 = 17;

#[derive(Debug, thiserror::Error)]
#[error("House '{0}' is not supported yet")]
pub struct UnsupportedHouse(pub House);

/// URL roots and identifiers making up the contract with the chamber's website.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SiteConfig {
    pub house: House,
    pub legislature: u32,
    pub base_url: String,
    pub documents_url: String,
}

impl SiteConfig {
    pub fn camera(legislature: u32) -> Self {
        Self {
            house: House::Camera,
            legislature,
            base_url: CAMERA_BASE_URL.to_string(),
            documents_url: CAMERA_DOCUMENTS_URL.to_string(),
        }
    }

    pub fn for_house(house: House, legislature: u32) -> Result<Self, UnsupportedHouse> {
        match house {
            House::Camera => Ok(Self::camera(legislature)),
            House::Senato => Err(UnsupportedHouse(house)),
        }
    }

    pub fn summary_url(&self, ym: YearMonth) -> String {
        format!(
            "{}/leg{}/207?annomese={:04},{:02}",
            self.base_url, self.legislature, ym.year, ym.month
        )
    }

    pub fn sitting_reference_url(&self, number: u32) -> String {
        format!(
            "{}/Leg{}/410?idSeduta={}",
            self.base_url, self.legislature, number
        )
    }

    pub fn votation_listing_url(&self, page: u32, date: NaiveDate) -> String {
        format!(
            "{}/risultatidb.asp?action=Votazioni&PagCorr={}&Legislatura={}&CDDGIORNO={}&CDDMESE={}&CDDANNO={}",
            self.documents_url,
            page,
            self.legislature,
            date.day(),
            date.month(),
            date.year()
        )
    }

    pub fn votation_detail_url(&self, reference: &ReferenceCode) -> String {
        format!(
            "{}/schedaVotazione.asp?Legislatura={}&RifVotazione={}",
            self.documents_url, self.legislature, reference
        )
    }

    /// Resolves a listing anchor's href against the documents root.
    pub fn votation_href_url(&self, href: &str) -> String {
        if href.starts_with("http") {
            href.to_string()
        } else {
            format!(
                "{}/{}",
                self.documents_url.trim_end_matches('/'),
                href.trim_start_matches('/')
            )
        }
    }
}

impl Default for SiteConfig {
    fn default() -> Self {
        Self::camera(DEFAULT_LEGISLATURE)
    }
}
