//! Tests for serve, status, sync, retry, remove and test-transport.

use super::parse;
use crate::cli::{Cli, CliCommand};
use clap::Parser;

#[test]
fn cli_parse_serve() {
    match parse(&["tubesync", "serve"]) {
        CliCommand::Serve => {}
        _ => panic!("expected Serve"),
    }
}

#[test]
fn cli_parse_status() {
    match parse(&["tubesync", "status"]) {
        CliCommand::Status => {}
        _ => panic!("expected Status"),
    }
}

#[test]
fn cli_parse_sync() {
    match parse(&["tubesync", "sync"]) {
        CliCommand::Sync => {}
        _ => panic!("expected Sync"),
    }
}

#[test]
fn cli_parse_retry() {
    match parse(&["tubesync", "retry", "17"]) {
        CliCommand::Retry { id } => assert_eq!(id, 17),
        _ => panic!("expected Retry"),
    }
}

#[test]
fn cli_parse_remove() {
    match parse(&["tubesync", "remove", "99"]) {
        CliCommand::Remove { id, delete_files } => {
            assert_eq!(id, 99);
            assert!(!delete_files);
        }
        _ => panic!("expected Remove"),
    }
}

#[test]
fn cli_parse_remove_delete_files() {
    match parse(&["tubesync", "remove", "5", "--delete-files"]) {
        CliCommand::Remove { id, delete_files } => {
            assert_eq!(id, 5);
            assert!(delete_files);
        }
        _ => panic!("expected Remove with --delete-files"),
    }
}

#[test]
fn cli_parse_test_transport() {
    match parse(&["tubesync", "test-transport"]) {
        CliCommand::TestTransport => {}
        _ => panic!("expected TestTransport"),
    }
}

#[test]
fn cli_rejects_non_numeric_id() {
    assert!(Cli::try_parse_from(["tubesync", "retry", "abc"]).is_err());
}

#[test]
fn cli_requires_subcommand() {
    assert!(Cli::try_parse_from(["tubesync"]).is_err());
}
