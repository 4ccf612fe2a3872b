mod common;

use assert_cmd::cargo_bin;
use assert_cmd::prelude::*;
use common::write_charges;
use predicates::prelude::*;
use std::process::Command;

#[test]
fn test_cli_end_to_end() -> Result<(), Box<dyn std::error::Error>> {
    let mut cmd = Command::new(cargo_bin!("chargeflow"));
    cmd.arg("tests/fixtures/charges.csv");

    cmd.assert()
        .success()
        .stdout(predicate::str::contains(
            "idempotency_key,payment_id,provider,amount,currency,status,provider_reference,failure_reason",
        ))
        .stdout(predicate::str::is_match(
            r"order-1,[0-9a-f-]{36},stripe-like,1000,USD,succeeded,stripe-like_order-1,\n",
        )?)
        .stdout(predicate::str::is_match(
            r"order-2,[0-9a-f-]{36},adyen-like,250,EUR,failed,,card_declined\n",
        )?)
        // Refused once, then retried.
        .stdout(predicate::str::is_match(
            r"order-3,[0-9a-f-]{36},stripe-like,4999,GBP,succeeded,stripe-like_order-3,\n",
        )?);

    Ok(())
}

#[test]
fn test_duplicate_rows_charge_once() {
    let csv = write_charges(&[
        "k1, stripe-like, 1000, USD, tok_visa,",
        "k1, stripe-like, 1000, USD, tok_visa,",
        "k1, adyen-like, 9999, EUR, tok_decline,",
    ]);

    let output = Command::new(cargo_bin!("chargeflow"))
        .arg(csv.path())
        .output()
        .unwrap();
    assert!(output.status.success());

    let stdout = String::from_utf8_lossy(&output.stdout);
    let lines: Vec<&str> = stdout.lines().collect();
    assert_eq!(lines.len(), 2);
    assert!(lines[1].starts_with("k1,"));
    assert!(lines[1].ends_with(",stripe-like,1000,USD,succeeded,stripe-like_k1,"));
}

#[test]
fn test_bad_rows_are_reported_and_skipped() {
    let csv = write_charges(&[
        "ok, stripe-like, 100, USD, tok_visa,",
        "zero, stripe-like, 0, USD, tok_visa,",
        "lower, stripe-like, 100, usd, tok_visa,",
        "elsewhere, unregistered, 100, USD, tok_visa,",
        "garbled, stripe-like, lots, USD, tok_visa,",
    ]);

    let output = Command::new(cargo_bin!("chargeflow"))
        .arg(csv.path())
        .output()
        .unwrap();
    assert!(output.status.success());

    let stdout = String::from_utf8_lossy(&output.stdout);
    assert_eq!(stdout.lines().count(), 2);
    assert!(stdout.contains(",stripe-like,100,USD,succeeded,stripe-like_ok,"));

    let stderr = String::from_utf8_lossy(&output.stderr);
    assert!(stderr.contains("invalid charge command"));
    assert!(stderr.contains("unknown payment provider 'unregistered'"));
    assert!(stderr.contains("error reading charge"));
}

#[test]
fn test_timed_out_charge_is_pending_until_reconciled() {
    let csv = write_charges(&["slow, stripe-like, 1000, USD, tok_timeout,"]);

    Command::new(cargo_bin!("chargeflow"))
        .arg(csv.path())
        .arg("--timeout-ms")
        .arg("100")
        .assert()
        .success()
        .stdout(predicate::str::contains(",stripe-like,1000,USD,pending,,"))
        .stderr(predicate::str::contains("left pending for reconciliation"));

    Command::new(cargo_bin!("chargeflow"))
        .arg(csv.path())
        .arg("--timeout-ms")
        .arg("100")
        .arg("--reconcile")
        .assert()
        .success()
        .stdout(predicate::str::contains(
            ",stripe-like,1000,USD,succeeded,stripe-like_slow,",
        ));
}

#[test]
fn test_unreachable_provider_resolves_to_failed() {
    let csv = write_charges(&["lost, adyen-like, 300, EUR, tok_unreachable,"]);

    Command::new(cargo_bin!("chargeflow"))
        .arg(csv.path())
        .arg("--max-retries")
        .arg("1")
        .assert()
        .success()
        .stdout(predicate::str::contains(",adyen-like,300,EUR,pending,,"));

    // The provider never saw the charge, so reconciliation marks it failed.
    Command::new(cargo_bin!("chargeflow"))
        .arg(csv.path())
        .arg("--max-retries")
        .arg("1")
        .arg("--reconcile")
        .assert()
        .success()
        .stdout(predicate::str::contains(
            ",adyen-like,300,EUR,failed,,no such charge",
        ));
}
