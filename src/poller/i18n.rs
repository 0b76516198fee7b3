use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use thiserror::Error;

use crate::models::Status;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Language {
    #[default]
    En,
    Bn,
}

impl Language {
    pub fn code(self) -> &'static str {
        match self {
            Language::En => "en",
            Language::Bn => "bn",
        }
    }

    pub fn toggle(self) -> Self {
        match self {
            Language::En => Language::Bn,
            Language::Bn => Language::En,
        }
    }
}

impl fmt::Display for Language {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.code())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("unsupported language code {0:?} (expected en or bn)")]
pub struct UnknownLanguage(pub String);

impl FromStr for Language {
    type Err = UnknownLanguage;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "en" => Ok(Language::En),
            "bn" => Ok(Language::Bn),
            other => Err(UnknownLanguage(other.to_string())),
        }
    }
}

pub fn badge(language: Language, status: Status) -> &'static str {
    match (language, status) {
        (Language::En, Status::Online) => "[ONLINE]",
        (Language::En, Status::Offline) => "[OFFLINE]",
        (Language::En, Status::Checking) => "[CHECKING]",
        (Language::En, Status::Unknown) => "[UNKNOWN]",
        (Language::Bn, Status::Online) => "[অনলাইন]",
        (Language::Bn, Status::Offline) => "[অফলাইন]",
        (Language::Bn, Status::Checking) => "[যাচাই চলছে]",
        (Language::Bn, Status::Unknown) => "[অজানা]",
    }
}

pub fn status_message(language: Language, status: Status) -> &'static str {
    match (language, status) {
        (Language::En, Status::Online) => "Submission portal is online and accepting leaks",
        (Language::En, Status::Offline) => {
            "Submission portal is temporarily offline. Please try again later."
        }
        (Language::En, Status::Checking) => "Checking submission portal status...",
        (Language::En, Status::Unknown) => {
            "Status cannot be verified. The portal may still be accessible via Tor Browser."
        }
        (Language::Bn, Status::Online) => "সাবমিশন পোর্টাল অনলাইন এবং লিক গ্রহণ করছে",
        (Language::Bn, Status::Offline) => {
            "সাবমিশন পোর্টাল সাময়িকভাবে অফলাইন। অনুগ্রহ করে পরে আবার চেষ্টা করুন।"
        }
        (Language::Bn, Status::Checking) => "সাবমিশন পোর্টাল স্ট্যাটাস চেক করা হচ্ছে...",
        (Language::Bn, Status::Unknown) => {
            "স্ট্যাটাস যাচাই করা যাচ্ছে না। পোর্টালটি এখনও টর ব্রাউজারের মাধ্যমে পাওয়া যেতে পারে।"
        }
    }
}

pub fn disabled_message(language: Language) -> &'static str {
    match language {
        Language::En => "Status checking is disabled",
        Language::Bn => "স্ট্যাটাস চেক বন্ধ রাখা হয়েছে",
    }
}

pub fn last_checked_label(language: Language) -> &'static str {
    match language {
        Language::En => "Last checked",
        Language::Bn => "সর্বশেষ যাচাই",
    }
}
