//! IRS e-file XML → [`Document`].
//!
//! Paths below are relative element paths in the `http://www.irs.gov/efile`
//! namespace, matched anywhere under the root (first match wins).

use roxmltree::Node;
use std::path::Path;
use tracing::{debug, info, warn};

use crate::errors::{FilingError, Result};
use crate::scan::scan_xml_files;
use crate::types::{Document, ParseOutcome, ParsedSegment, SkipReason};

pub const IRS_NAMESPACE: &str = "http://www.irs.gov/efile";

/// Return types that never become documents.
pub const RETURN_TYPES_TO_SKIP: &[&str] = &["990PF", "990T", "990N"];

const ACTIVITY_PATHS: &[&str] = &[
    "ActivityOrMissionDesc",
    "SummaryOfDirectChrtblActyGrp/Description1Txt",
    "SummaryOfDirectChrtblActyGrp/Description2Txt",
    "ProgSrvcAccomActy2Grp/Desc",
    "ProgSrvcAccomActy3Grp/Desc",
];

const NO_WEBSITE: &str = "None Provided";

fn is_irs(node: &Node, name: &str) -> bool {
    node.is_element()
        && node.tag_name().name() == name
        && node.tag_name().namespace() == Some(IRS_NAMESPACE)
}

/// All elements matching `A/B/...`, where `A` may sit at any depth.
fn find_all<'a, 'input>(root: Node<'a, 'input>, path: &str) -> Vec<Node<'a, 'input>> {
    let mut steps = path.split('/');
    let Some(first) = steps.next() else {
        return Vec::new();
    };
    let mut current: Vec<Node<'a, 'input>> =
        root.descendants().filter(|n| is_irs(n, first)).collect();
    for step in steps {
        current = current
            .iter()
            .flat_map(|n| n.children().filter(move |c| is_irs(c, step)))
            .collect();
    }
    current
}

fn node_text(node: Node) -> Option<String> {
    node.text()
        .map(str::trim)
        .filter(|t| !t.is_empty())
        .map(str::to_string)
}

fn field(root: Node, path: &str) -> Option<String> {
    find_all(root, path).into_iter().next().and_then(node_text)
}

fn all_fields(root: Node, path: &str) -> Vec<String> {
    find_all(root, path).into_iter().filter_map(node_text).collect()
}

fn number<T: std::str::FromStr>(root: Node, path: &str) -> Option<T> {
    let raw = field(root, path)?;
    match raw.parse::<T>() {
        Ok(v) => Some(v),
        Err(_) => {
            debug!(path, value = %raw, "non-numeric amount ignored");
            None
        }
    }
}

/// Present values joined with `"; "`; `None` when nothing is present.
fn combine<I>(items: I) -> Option<String>
where
    I: IntoIterator<Item = Option<String>>,
{
    let parts: Vec<String> = items.into_iter().flatten().collect();
    if parts.is_empty() {
        None
    } else {
        Some(parts.join("; "))
    }
}

fn or_none(v: Option<String>) -> String {
    v.unwrap_or_else(|| "None".to_string())
}

/// Parses one filing.
///
/// Excluded return types and foreign filers come back as
/// [`ParseOutcome::Skipped`]; only malformed XML is an error.
///
/// # Errors
/// Returns [`FilingError::Xml`] if `xml` is not well-formed.
pub fn parse_filing(xml: &str) -> Result<ParseOutcome> {
    let doc = roxmltree::Document::parse(xml)?;
    let root = doc.root_element();

    let return_type = field(root, "ReturnTypeCd");
    if let Some(rt) = return_type.as_deref() {
        if RETURN_TYPES_TO_SKIP.contains(&rt) {
            return Ok(ParseOutcome::Skipped(SkipReason::ExcludedReturnType(
                rt.to_string(),
            )));
        }
    }

    if !find_all(root, "ForeignAddress").is_empty() {
        return Ok(ParseOutcome::Skipped(SkipReason::ForeignAddress { return_type }));
    }

    let period_start = field(root, "TaxPeriodBeginDt");
    let period_end = field(root, "TaxPeriodEndDt");
    let tax_period = (period_start.is_some() || period_end.is_some())
        .then(|| format!("{} to {}", or_none(period_start), or_none(period_end)));

    let name = field(root, "BusinessName/BusinessNameLine1Txt").map(|line1| {
        match field(root, "BusinessName/BusinessNameLine2Txt") {
            Some(line2) => format!("{line1} {line2}"),
            None => line1,
        }
    });

    let street = field(root, "USAddress/AddressLine1Txt");
    let city = field(root, "USAddress/CityNm");
    let state = field(root, "USAddress/StateAbbreviationCd");
    let zip = field(root, "USAddress/ZIPCd");
    let address = (street.is_some() || city.is_some()).then(|| {
        format!(
            "{}, {}, {} {}",
            or_none(street),
            or_none(city),
            or_none(state),
            or_none(zip)
        )
    });

    let purpose = combine([
        field(root, "MissionDesc"),
        field(root, "IRS990/Desc"),
        field(root, "PrimaryExemptPurposeTxt"),
    ]);

    let activities = combine(ACTIVITY_PATHS.iter().map(|p| field(root, p)));

    let website = Some(field(root, "WebsiteAddressTxt").unwrap_or_else(|| NO_WEBSITE.to_string()));

    let accomplishments = combine(
        all_fields(root, "DescriptionProgramSrvcAccomTxt")
            .into_iter()
            .map(Some),
    );
    let revenue_categories =
        combine(all_fields(root, "ProgramServiceRevenueGrp/Desc").into_iter().map(Some));
    let expense_categories =
        combine(all_fields(root, "OtherExpensesGrp/Desc").into_iter().map(Some));

    let total_revenue =
        number::<f64>(root, "TotalRevenueAmt").or_else(|| number(root, "CYTotalRevenueAmt"));
    let total_expenses =
        number::<f64>(root, "TotalExpensesAmt").or_else(|| number(root, "CYTotalExpensesAmt"));

    Ok(ParseOutcome::Parsed(Box::new(Document {
        return_type,
        ein: field(root, "Filer/EIN"),
        tax_year: field(root, "TaxYr"),
        tax_period,
        name,
        address,
        purpose,
        activities,
        website,
        accomplishments,
        revenue_categories,
        expense_categories,
        total_revenue,
        total_expenses,
        employee_count: number(root, "TotalEmployeeCnt"),
        volunteer_count: number(root, "TotalVolunteersCnt"),
    })))
}

/// Reads and parses one filing from disk.
///
/// # Errors
/// - [`FilingError::Io`] if the file cannot be read
/// - [`FilingError::XmlFile`] if it is not well-formed XML
pub fn parse_file(path: &Path) -> Result<ParseOutcome> {
    let xml = std::fs::read_to_string(path)?;
    parse_filing(&xml).map_err(|e| match e {
        FilingError::Xml(source) => FilingError::XmlFile {
            path: path.to_path_buf(),
            source,
        },
        other => other,
    })
}

/// Parses every `*.xml` file under `dir`.
///
/// Malformed files are logged and counted, not fatal. The return-type tally
/// covers every filing that was not excluded by its type, including foreign
/// filers.
///
/// # Errors
/// - [`FilingError::NotADirectory`] if `dir` is not a directory
/// - [`FilingError::Io`] if a file cannot be read
pub fn parse_dir(dir: &Path) -> Result<ParsedSegment> {
    if !dir.is_dir() {
        return Err(FilingError::NotADirectory(dir.to_path_buf()));
    }

    let files = scan_xml_files(dir);
    let mut out = ParsedSegment::default();

    for path in &files {
        match parse_file(path) {
            Ok(ParseOutcome::Parsed(doc)) => {
                out.tally.record(doc.return_type.as_deref());
                out.documents.push(*doc);
            }
            Ok(ParseOutcome::Skipped(reason)) => {
                if let SkipReason::ForeignAddress { return_type } = &reason {
                    out.tally.record(return_type.as_deref());
                }
                debug!(path = %path.display(), ?reason, "filing skipped");
                out.skipped += 1;
            }
            Err(FilingError::XmlFile { path, source }) => {
                warn!(path = %path.display(), error = %source, "malformed filing skipped");
                out.malformed += 1;
            }
            Err(e) => return Err(e),
        }
    }

    info!(
        dir = %dir.display(),
        files = files.len(),
        documents = out.documents.len(),
        skipped = out.skipped,
        malformed = out.malformed,
        "parsed filings"
    );

    Ok(out)
}
