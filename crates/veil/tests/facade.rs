use veil::{obfuscate, parse, validate, ObfuscationConfig, OutputFormat, RunReport, PASS_ORDER};

const SOURCE: &str = r#"// SPDX-License-Identifier: MIT
pragma solidity ^0.8.20;

contract Escrow {
    address private payer;
    uint256 private held;

    constructor() {
        payer = msg.sender;
    }

    function hold(uint256 amount) public returns (uint256) {
        require(msg.sender == payer, "payer only");
        held = held + amount;
        return held;
    }
}
"#;

#[test]
fn test_obfuscate_through_facade() {
    let output = obfuscate(SOURCE, ObfuscationConfig::standard().with_seed(9)).unwrap();
    assert_eq!(output.snapshots.len(), PASS_ORDER.len());
    assert!(validate(&output.source).is_ok());

    let tree = parse(&output.source).unwrap();
    assert_eq!(tree.contracts().count(), 1);

    let mapping = output.mapping.as_ref().unwrap();
    assert!(mapping.mapping.values().any(|original| original == "held"));
    assert!(mapping.mapping.values().any(|original| original == "payer"));

    let report = RunReport::from_output(SOURCE, &output, Some(9));
    assert!(report.render(OutputFormat::Text, false).unwrap().contains("rename"));
}

#[test]
fn test_facade_reports_bad_input() {
    let error = obfuscate("contract Escrow {", ObfuscationConfig::default()).unwrap_err();
    assert_eq!(error.pass, "input");
    assert!(error.snapshots.is_empty());
}
