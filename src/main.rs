//! Parses RPKI objects and prints their content.
//!
//! Every positional argument is parsed according to its file extension.
//! With `-v`, a summary of each parsed object is printed to standard
//! output; diagnostics always go to standard error. The process exits
//! with 0 only if every file parsed successfully.

use std::path::Path;
use std::process::exit;
use clap::{crate_version, App, Arg};
use log::error;
use rpvalid::{cert, mft, roa, tal};
use rpvalid::cert::Cert;
use rpvalid::error::{ExitError, Failed};
use rpvalid::mft::Mft;
use rpvalid::roa::Roa;
use rpvalid::tal::Tal;

fn _main() -> Result<(), ExitError> {
    let matches = App::new("rpvalid")
        .version(crate_version!())
        .about("parses and validates RPKI signed objects")
        .arg(Arg::with_name("verbose")
             .short("v")
             .long("verbose")
             .multiple(true)
             .help("Print more information"))
        .arg(Arg::with_name("files")
             .value_name("FILE")
             .required(true)
             .multiple(true)
             .help("Files to parse"))
        .get_matches();

    let verbose = matches.occurrences_of("verbose");
    rpvalid::log::init(verbose)?;

    let mut failed = false;
    for path in matches.values_of("files").unwrap() {
        if process_file(Path::new(path), verbose > 0).is_err() {
            failed = true;
        }
    }
    if failed {
        Err(ExitError::Invalid)
    }
    else {
        Ok(())
    }
}

/// Parses a single file, dispatching on its extension.
///
/// A failure only aborts this one object; the caller moves on to its
/// peers.
fn process_file(path: &Path, print: bool) -> Result<(), Failed> {
    match path.extension().and_then(|ext| ext.to_str()) {
        Some("tal") => {
            let tal = tal::parse(path)?;
            if print {
                print_tal(&tal);
            }
            Ok(())
        }
        Some("cer") => {
            let (cert, _handle) = cert::parse(path, None)?;
            if print {
                print_cert(&cert);
            }
            Ok(())
        }
        Some("mft") => {
            let mft = mft::parse(None, path, None)?;
            if print {
                print_mft(&mft);
            }
            Ok(())
        }
        Some("roa") => {
            let roa = roa::parse(None, path, None)?;
            if print {
                print_roa(&roa);
            }
            Ok(())
        }
        _ => {
            error!("{}: unknown file type", path.display());
            Err(Failed)
        }
    }
}

fn print_tal(tal: &Tal) {
    for (i, uri) in tal.uris().iter().enumerate() {
        println!("{:5}: URI: {}", i + 1, uri);
    }
}

fn print_cert(cert: &Cert) {
    if let Some(uri) = cert.ca_repository() {
        println!("CA repository: {}", uri);
    }
    if let Some(uri) = cert.rpki_manifest() {
        println!("Manifest: {}", uri);
    }
    for (i, id) in cert.as_resources().iter().enumerate() {
        println!("{:5}: AS: {}", i + 1, id);
    }
    for (i, ip) in cert.ips().iter().enumerate() {
        println!("{:5}: IP: {}", i + 1, ip);
    }
}

fn print_mft(mft: &Mft) {
    for (i, item) in mft.files().iter().enumerate() {
        println!("{:5}: File: {}", i + 1, item.file());
    }
}

fn print_roa(roa: &Roa) {
    println!("AS: {}", roa.as_id());
    for (i, prefix) in roa.prefixes().iter().enumerate() {
        println!("{:5}: IP: {}", i + 1, prefix);
    }
}

fn main() {
    match _main() {
        Ok(()) => exit(0),
        Err(err) => exit(err.exit_code()),
    }
}
