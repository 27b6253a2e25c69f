//! Timed rounds over the lister output, one loopback server per suite.

use std::time::Duration;

use tls_echo::crypto::suite;
use tls_echo::error::Error;
use tls_echo::lister::{parse_listing, write_listing};
use tls_echo::profile::{Outcome, Summary, measure_with_local_server, run_listing};

const REQUEST: &[u8] = b"GET / HTTP/1.0\r\n\r\n";

#[test]
fn every_listed_suite_is_measured() {
    let mut listing = Vec::new();
    write_listing(&mut listing, suite::enabled()).expect("write to a Vec");
    let entries = parse_listing(&String::from_utf8(listing).expect("UTF-8")).expect("parses");

    let (outcomes, summary) = run_listing(&entries, |entry| {
        measure_with_local_server(entry, REQUEST, Duration::from_secs(10))
    });

    assert_eq!(
        summary,
        Summary {
            total: suite::enabled().len(),
            measured: suite::enabled().len(),
            skipped: 0,
        }
    );
    for (outcome, suite) in outcomes.iter().zip(suite::enabled()) {
        match outcome {
            Outcome::Measured(m) => {
                assert_eq!(m.id, suite.id);
                assert_eq!(m.response, b"pong");
                assert!(m.handshake > Duration::ZERO);
            }
            Outcome::Skipped { entry, error } => panic!("{} skipped: {error}", entry.name),
        }
    }
}

#[test]
fn unregistered_suite_is_skipped_and_the_run_goes_on() {
    let text = "4660 TLS-NOT-REGISTERED NONE\n49199 TLS-ECDHE-RSA-WITH-AES-128-GCM-SHA256 NONE\n";
    let entries = parse_listing(text).expect("parses");

    let (outcomes, summary) = run_listing(&entries, |entry| {
        measure_with_local_server(entry, REQUEST, Duration::from_secs(10))
    });

    assert_eq!(summary.to_string(), "Total CipherSuites: 2\nMeasured: 1\nSkipped: 1");
    assert!(matches!(
        &outcomes[0],
        Outcome::Skipped { error: Error::Config(_) | Error::UnknownCiphersuite(_), .. }
    ));
    assert!(outcomes[1].is_measured());
}
