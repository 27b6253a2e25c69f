//! Properties of the ciphersuite listing.

use std::collections::HashSet;

use tls_echo::crypto::suite::{self, lookup};
use tls_echo::lister::{FLAG_LABELS, parse_listing, write_listing};

fn listing() -> String {
    let mut out = Vec::new();
    write_listing(&mut out, suite::enabled()).expect("write to a Vec");
    String::from_utf8(out).expect("listing is UTF-8")
}

#[test]
fn one_line_per_enabled_suite() {
    let text = listing();
    assert_eq!(text.lines().count(), suite::enabled().len());

    let ids: HashSet<&str> = text
        .lines()
        .filter_map(|line| line.split(' ').next())
        .collect();
    assert_eq!(ids.len(), suite::enabled().len(), "duplicate id in listing");
}

#[test]
fn flags_are_one_of_the_literal_labels() {
    for line in listing().lines() {
        let flags = line.rsplit(' ').next().unwrap_or_default();
        assert!(FLAG_LABELS.contains(&flags), "bad flags in `{line}`");
    }
}

#[test]
fn listing_reads_back_and_every_id_resolves() {
    let entries = parse_listing(&listing()).expect("own output parses");
    assert_eq!(entries.len(), suite::enabled().len());
    for (entry, suite) in entries.iter().zip(suite::enabled()) {
        assert_eq!(entry.id, suite.id);
        assert_eq!(entry.name, suite.name);
        let found = lookup(entry.id).expect("listed id is registered");
        assert_eq!(found.id, entry.id);
    }
}

#[test]
fn unregistered_ids_are_not_found() {
    assert!(lookup(0x0000).is_none());
    assert!(lookup(0xFFFF).is_none());
}
