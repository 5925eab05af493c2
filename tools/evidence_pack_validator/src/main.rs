//! Offline re-verification of an Evidence Pack ZIP (§4.13, §4.16): every
//! `pack_files` hash is recomputed against the actual entry bytes, and every
//! `documents/<sha256>.bin` entry's name is checked against its own content
//! hash. Exits non-zero when any check fails.

use compliance_core::determinism::sha256_hex;
use serde::{Deserialize, Serialize};
use std::io::Read;
use std::path::Path;
use zip::ZipArchive;

#[derive(Debug, Serialize)]
struct CheckResult {
    check_id: String,
    result: String,
    message: String,
}

#[derive(Debug, Serialize)]
struct ValidationSummary {
    run_id: String,
    overall: String,
    checks: Vec<CheckResult>,
}

#[derive(Debug, Deserialize)]
struct PackFileEntry {
    path: String,
    sha256: String,
}

#[derive(Debug, Deserialize)]
struct PackManifest {
    run_id: String,
    #[allow(dead_code)]
    documents: Vec<String>,
    pack_files: Vec<PackFileEntry>,
}

fn read_entry_bytes<R: Read + std::io::Seek>(
    archive: &mut ZipArchive<R>,
    name: &str,
) -> Result<Vec<u8>, String> {
    let mut entry = archive
        .by_name(name)
        .map_err(|_| format!("entry {name} listed in manifest but missing from archive"))?;
    let mut buf = Vec::new();
    entry.read_to_end(&mut buf).map_err(|e| e.to_string())?;
    Ok(buf)
}

fn validate_zip(path: &Path) -> Result<ValidationSummary, String> {
    let file = std::fs::File::open(path).map_err(|e| e.to_string())?;
    let mut archive = ZipArchive::new(file).map_err(|e| e.to_string())?;

    let manifest: PackManifest = {
        let buf = read_entry_bytes(&mut archive, "manifest.json")?;
        serde_json::from_slice(&buf).map_err(|e| format!("manifest.json is not valid JSON: {e}"))?
    };

    let mut checks = Vec::new();

    for entry in &manifest.pack_files {
        if entry.path == "manifest.json" {
            checks.push(CheckResult {
                check_id: format!("pack_file_hash:{}", entry.path),
                result: "FAIL".to_string(),
                message: "manifest.json must not list its own hash".to_string(),
            });
            continue;
        }
        checks.push(match read_entry_bytes(&mut archive, &entry.path) {
            Ok(bytes) => {
                let actual = sha256_hex(&bytes);
                if actual == entry.sha256 {
                    CheckResult {
                        check_id: format!("pack_file_hash:{}", entry.path),
                        result: "PASS".to_string(),
                        message: format!("sha256 matches: {actual}"),
                    }
                } else {
                    CheckResult {
                        check_id: format!("pack_file_hash:{}", entry.path),
                        result: "FAIL".to_string(),
                        message: format!("manifest claims {}, content hashes to {actual}", entry.sha256),
                    }
                }
            }
            Err(message) => CheckResult {
                check_id: format!("pack_file_hash:{}", entry.path),
                result: "FAIL".to_string(),
                message,
            },
        });
    }

    let document_entry_names: Vec<String> = (0..archive.len())
        .map(|i| archive.by_index(i).map(|f| f.name().to_string()))
        .collect::<Result<_, _>>()
        .map_err(|e| e.to_string())?;

    for name in document_entry_names {
        let Some(claimed_hash) = name
            .strip_prefix("documents/")
            .and_then(|s| s.strip_suffix(".bin"))
        else {
            continue;
        };
        checks.push(match read_entry_bytes(&mut archive, &name) {
            Ok(bytes) => {
                let actual = sha256_hex(&bytes);
                if actual == claimed_hash {
                    CheckResult {
                        check_id: format!("document_entry_name:{name}"),
                        result: "PASS".to_string(),
                        message: format!("entry name matches content hash: {actual}"),
                    }
                } else {
                    CheckResult {
                        check_id: format!("document_entry_name:{name}"),
                        result: "FAIL".to_string(),
                        message: format!("entry name claims {claimed_hash}, content hashes to {actual}"),
                    }
                }
            }
            Err(message) => CheckResult {
                check_id: format!("document_entry_name:{name}"),
                result: "FAIL".to_string(),
                message,
            },
        });
    }

    checks.sort_by(|a, b| a.check_id.cmp(&b.check_id));
    let overall = if checks.iter().all(|c| c.result == "PASS") { "PASS" } else { "FAIL" };
    Ok(ValidationSummary {
        run_id: manifest.run_id,
        overall: overall.to_string(),
        checks,
    })
}

fn main() {
    let args: Vec<String> = std::env::args().collect();
    if args.len() < 2 {
        eprintln!("usage: evidence_pack_validator <path/to/run-*-evidence-pack.zip>");
        std::process::exit(2);
    }
    let path = Path::new(&args[1]);
    match validate_zip(path) {
        Ok(summary) => {
            println!("{}", serde_json::to_string_pretty(&summary).unwrap());
            if summary.overall == "PASS" {
                std::process::exit(0);
            } else {
                std::process::exit(1);
            }
        }
        Err(e) => {
            eprintln!("validator error: {e}");
            std::process::exit(1);
        }
    }
}
