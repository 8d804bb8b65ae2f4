use std::fs;
use std::path::Path;

use filings::{FilingError, parse_dir};

fn write_filing(dir: &Path, name: &str, return_type: &str, address: &str) {
    let xml = format!(
        r#"<Return xmlns="http://www.irs.gov/efile">
  <ReturnHeader>
    <ReturnTypeCd>{return_type}</ReturnTypeCd>
    <Filer><EIN>{name}</EIN>{address}</Filer>
  </ReturnHeader>
</Return>"#
    );
    fs::write(dir.join(format!("{name}_public.xml")), xml).unwrap();
}

const US: &str = "<USAddress><CityNm>AUSTIN</CityNm></USAddress>";
const FOREIGN: &str = "<ForeignAddress><CountryCd>MX</CountryCd></ForeignAddress>";

#[test]
fn parses_a_segment_and_tallies_return_types() {
    let tmp = tempfile::tempdir().unwrap();
    let nested = tmp.path().join("segment_01A");
    fs::create_dir_all(&nested).unwrap();

    write_filing(tmp.path(), "100000001", "990", US);
    write_filing(&nested, "100000002", "990EZ", US);
    write_filing(&nested, "100000003", "990", FOREIGN);
    write_filing(tmp.path(), "100000004", "990PF", US);
    fs::write(tmp.path().join("broken.xml"), "<Return>").unwrap();
    fs::write(tmp.path().join("notes.txt"), "not a filing").unwrap();

    let seg = parse_dir(tmp.path()).unwrap();

    let eins: Vec<_> = seg.documents.iter().filter_map(|d| d.ein.as_deref()).collect();
    assert_eq!(eins, vec!["100000001", "100000002"]);
    assert_eq!(seg.skipped, 2);
    assert_eq!(seg.malformed, 1);

    // Foreign filers are counted, excluded types are not.
    assert_eq!(seg.tally.get("990"), 2);
    assert_eq!(seg.tally.get("990EZ"), 1);
    assert_eq!(seg.tally.get("990PF"), 0);
    assert_eq!(seg.tally.total(), 3);
}

#[test]
fn missing_directory_is_an_error() {
    let tmp = tempfile::tempdir().unwrap();
    let err = parse_dir(&tmp.path().join("nope")).unwrap_err();
    assert!(matches!(err, FilingError::NotADirectory(_)));
}
