//! DSN (delivery status notification) bounce analysis.
//!
//! Grounded on `original_source/salmon/bounce.py`'s `detect`/`BounceAnalyzer`,
//! ported field-for-field: the same header set, the same scoring formula,
//! and the same RFC 3463 status tables, simplified from Python's duck-typed
//! regex-groups-as-whatever into a small typed `BounceMatch` per header.

use std::collections::{BTreeMap, HashMap, HashSet};

use lazy_static::lazy_static;
use regex::Regex;

use crate::mail_base::MailBase;

/// The fixed DSN header set scanned on every MIME part, in the order they
/// contribute to the score denominator.
const BOUNCE_HEADERS: [&str; 8] = [
    "Action",
    "Content-Description",
    "Diagnostic-Code",
    "Final-Recipient",
    "Received",
    "Remote-Mta",
    "Reporting-Mta",
    "Status",
];

lazy_static! {
    static ref BOUNCE_MATCHERS: HashMap<&'static str, Regex> = {
        let mut m = HashMap::new();
        m.insert("Action", Regex::new(r"(?is)(failed|delayed|delivered|relayed|expanded)").unwrap());
        m.insert(
            "Content-Description",
            Regex::new(r"(?is)(Notification|Undelivered Message|Delivery Report)").unwrap(),
        );
        m.insert("Diagnostic-Code", Regex::new(r"(?is)^(.+);\s*([0-9\-.]+)?\s*(.*)$").unwrap());
        m.insert("Final-Recipient", Regex::new(r"(?is)^(.+);\s*(.*)$").unwrap());
        m.insert("Received", Regex::new(r"(?is)(.+)").unwrap());
        m.insert("Remote-Mta", Regex::new(r"(?is)^(.+);\s*(.*)$").unwrap());
        m.insert("Reporting-Mta", Regex::new(r"(?is)^(.+);\s*(.*)$").unwrap());
        m.insert("Status", Regex::new(r"^([0-9]+)\.([0-9]+)\.([0-9]+)").unwrap());
        m
    };
    static ref PRIMARY_STATUS_CODES: HashMap<&'static str, &'static str> = {
        let mut m = HashMap::new();
        m.insert("1", "Unknown Status Code 1");
        m.insert("2", "Success");
        m.insert("3", "Temporary Failure");
        m.insert("4", "Persistent Transient Failure");
        m.insert("5", "Permanent Failure");
        m
    };
    static ref SECONDARY_STATUS_CODES: HashMap<&'static str, &'static str> = {
        let mut m = HashMap::new();
        m.insert("0", "Other or Undefined Status");
        m.insert("1", "Addressing Status");
        m.insert("2", "Mailbox Status");
        m.insert("3", "Mail System Status");
        m.insert("4", "Network and Routing Status");
        m.insert("5", "Mail Delivery Protocol Status");
        m.insert("6", "Message Content or Media Status");
        m.insert("7", "Security or Policy Status");
        m
    };
    static ref COMBINED_STATUS_CODES: HashMap<&'static str, &'static str> = {
        let mut m = HashMap::new();
        for (k, v) in [
            ("00", "Not Applicable"),
            ("10", "Other address status"),
            ("11", "Bad destination mailbox address"),
            ("12", "Bad destination system address"),
            ("13", "Bad destination mailbox address syntax"),
            ("14", "Destination mailbox address ambiguous"),
            ("15", "Destination mailbox address valid"),
            ("16", "Mailbox has moved"),
            ("17", "Bad sender's mailbox address syntax"),
            ("18", "Bad sender's system address"),
            ("20", "Other or undefined mailbox status"),
            ("21", "Mailbox disabled, not accepting messages"),
            ("22", "Mailbox full"),
            ("23", "Message length exceeds administrative limit."),
            ("24", "Mailing list expansion problem"),
            ("30", "Other or undefined mail system status"),
            ("31", "Mail system full"),
            ("32", "System not accepting network messages"),
            ("33", "System not capable of selected features"),
            ("34", "Message too big for system"),
            ("40", "Other or undefined network or routing status"),
            ("41", "No answer from host"),
            ("42", "Bad connection"),
            ("43", "Routing server failure"),
            ("44", "Unable to route"),
            ("45", "Network congestion"),
            ("46", "Routing loop detected"),
            ("47", "Delivery time expired"),
            ("50", "Other or undefined protocol status"),
            ("51", "Invalid command"),
            ("52", "Syntax error"),
            ("53", "Too many recipients"),
            ("54", "Invalid command arguments"),
            ("55", "Wrong protocol version"),
            ("60", "Other or undefined media error"),
            ("61", "Media not supported"),
            ("62", "Conversion required and prohibited"),
            ("63", "Conversion required but not supported"),
            ("64", "Conversion with loss performed"),
            ("65", "Conversion failed"),
            ("70", "Other or undefined security status"),
            ("71", "Delivery not authorized, message refused"),
            ("72", "Mailing list expansion prohibited"),
            ("73", "Security conversion required but not possible"),
            ("74", "Security features not supported"),
            ("75", "Cryptographic failure"),
            ("76", "Cryptographic algorithm not supported"),
            ("77", "Message integrity failure"),
        ] {
            m.insert(k, v);
        }
        m
    };
}

/// Derived status fields: a numeric code plus its RFC 3463 human-readable
/// meaning.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Status {
    pub code: u32,
    pub meaning: String,
}

#[derive(Debug, Clone, Default)]
pub struct BounceAnalysis {
    pub score: f64,
    pub primary_status: Option<Status>,
    pub secondary_status: Option<Status>,
    pub combined_status: Option<Status>,
    pub remote_mta: Option<String>,
    pub reporting_mta: Option<String>,
    pub final_recipient: Option<String>,
    pub diagnostic_codes: Option<(Option<String>, String)>,
    pub action: Option<String>,
    /// The human-readable notification part (`Content-Description:
    /// notification`), if present.
    pub notification: Option<MailBase>,
    /// The machine-readable delivery report parts (`Content-Description:
    /// delivery report`), unwrapped to its children if it has any.
    pub report: Option<Vec<MailBase>>,
    /// The original message that bounced (`Content-Description: undelivered
    /// message`), unwrapped to its first child if it has any.
    pub original: Option<MailBase>,
}

impl BounceAnalysis {
    pub fn probable(&self) -> bool {
        self.probable_at(0.3)
    }

    pub fn probable_at(&self, threshold: f64) -> bool {
        self.score > threshold
    }

    pub fn is_hard(&self) -> bool {
        self.probable() && self.primary_status.as_ref().map(|s| s.code > 4).unwrap_or(false)
    }

    pub fn is_soft(&self) -> bool {
        self.probable() && self.primary_status.as_ref().map(|s| s.code <= 4).unwrap_or(false)
    }
}

/// Walk every part of `mail`, collect the per-header value sets, run each
/// through its matcher, and fold the result into a `BounceAnalysis`.
pub fn detect(mail: &MailBase) -> BounceAnalysis {
    let mut raw_values: HashMap<&'static str, HashSet<String>> = HashMap::new();
    let mut content_description_parts: HashMap<String, MailBase> = HashMap::new();
    for part in mail.walk() {
        for header in BOUNCE_HEADERS {
            if let Some(value) = part.header(header) {
                raw_values.entry(header).or_default().insert(value.to_owned());
                if header == "Content-Description" {
                    content_description_parts.insert(value.to_ascii_lowercase(), part.clone());
                }
            }
        }
    }

    let mut score = 0.0;
    let mut matched: HashMap<&'static str, Vec<Vec<Option<String>>>> = HashMap::new();

    for header in BOUNCE_HEADERS {
        let Some(values) = raw_values.get(header) else {
            continue;
        };
        score += 1.0;
        let regex = &BOUNCE_MATCHERS[header];
        let groups: Vec<Vec<Option<String>>> = values
            .iter()
            .filter_map(|v| regex.captures(v))
            .map(|caps| {
                (1..caps.len())
                    .map(|i| caps.get(i).map(|m| m.as_str().to_owned()))
                    .collect()
            })
            .collect();
        if !groups.is_empty() {
            score += groups.len() as f64 / values.len() as f64;
            matched.insert(header, groups);
        }
    }

    let probability = score / (BOUNCE_HEADERS.len() as f64 * 2.0);
    let mut analysis = BounceAnalysis {
        score: probability,
        ..Default::default()
    };

    if let Some(status_groups) = matched.get("Status").and_then(|g| g.first()) {
        if let [Some(p), Some(s), Some(c)] = [status_groups[0].clone(), status_groups[1].clone(), status_groups[2].clone()] {
            analysis.primary_status = lookup_status(&PRIMARY_STATUS_CODES, &p);
            analysis.secondary_status = lookup_status(&SECONDARY_STATUS_CODES, &s);
            let combined_key = format!("{s}{c}");
            analysis.combined_status = lookup_status(&COMBINED_STATUS_CODES, &combined_key);
        }
    }

    analysis.remote_mta = matched.get("Remote-Mta").and_then(|g| g.first()).and_then(|g| g[1].clone());
    analysis.reporting_mta = matched
        .get("Reporting-Mta")
        .and_then(|g| g.first())
        .and_then(|g| g[1].clone());
    analysis.final_recipient = matched
        .get("Final-Recipient")
        .and_then(|g| g.first())
        .and_then(|g| g[1].clone());
    analysis.diagnostic_codes = matched.get("Diagnostic-Code").and_then(|g| g.first()).map(|g| {
        (g.get(1).cloned().flatten(), g.get(2).cloned().flatten().unwrap_or_default())
    });
    analysis.action = matched.get("Action").and_then(|g| g.first()).and_then(|g| g[0].clone());

    analysis.original = content_description_parts.get("undelivered message").map(|part| {
        part.parts().first().cloned().unwrap_or_else(|| part.clone())
    });
    analysis.report = content_description_parts.get("delivery report").map(|part| {
        if part.parts().is_empty() {
            vec![part.clone()]
        } else {
            part.parts().to_vec()
        }
    });
    analysis.notification = content_description_parts.get("notification").cloned();

    analysis
}

fn lookup_status(table: &HashMap<&'static str, &'static str>, key: &str) -> Option<Status> {
    let code: u32 = key.parse().ok()?;
    let meaning = table.get(key)?;
    Some(Status {
        code,
        meaning: meaning.to_string(),
    })
}

/// A plain lookup of every RFC 3463 combined code, for callers that want
/// the full table rather than a single derived status (e.g. a diagnostics
/// dump).
pub fn combined_status_table() -> BTreeMap<&'static str, &'static str> {
    COMBINED_STATUS_CODES.iter().map(|(k, v)| (*k, *v)).collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::parse::parse;

    fn dsn(status: &str) -> MailBase {
        let raw = format!(
            "Action: failed\r\n\
             Final-Recipient: rfc822; someone@example.com\r\n\
             Remote-Mta: dns; mx.example.com\r\n\
             Reporting-Mta: dns; mail.example.com\r\n\
             Diagnostic-Code: smtp; 550 5.1.1 unknown user\r\n\
             Status: {status}\r\n\
             Content-Description: Notification\r\n\
             Received: from somewhere\r\n\r\nbody\r\n"
        );
        parse(raw.as_bytes()).unwrap()
    }

    #[test]
    fn all_eight_headers_present_scores_one_and_is_probable() {
        let mail = dsn("5.1.1");
        let analysis = detect(&mail);
        assert!((analysis.score - 1.0).abs() < 1e-9);
        assert!(analysis.probable());
    }

    #[test]
    fn hard_bounce_classification_for_5_1_1() {
        let mail = dsn("5.1.1");
        let analysis = detect(&mail);
        assert_eq!(analysis.primary_status.as_ref().unwrap().code, 5);
        assert_eq!(analysis.primary_status.as_ref().unwrap().meaning, "Permanent Failure");
        assert_eq!(analysis.combined_status.as_ref().unwrap().code, 11);
        assert_eq!(
            analysis.combined_status.as_ref().unwrap().meaning,
            "Bad destination mailbox address"
        );
        assert!(analysis.is_hard());
        assert!(!analysis.is_soft());
    }

    #[test]
    fn soft_bounce_classification_for_4_x_x() {
        let mail = dsn("4.4.1");
        let analysis = detect(&mail);
        assert!(analysis.is_soft());
        assert!(!analysis.is_hard());
    }

    #[test]
    fn message_with_no_bounce_headers_is_not_probable() {
        let raw = b"Subject: hi\r\n\r\njust a normal message";
        let mail = parse(raw).unwrap();
        let analysis = detect(&mail);
        assert!(!analysis.probable());
    }
}
