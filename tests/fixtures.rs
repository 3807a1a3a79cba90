use bytes::Bytes;
use ethereum_types::U256;
use evmdiff::eips::{
    ecosystem_fixture, find_eip, fixture_addresses, generate_test_cases, native_fixture,
    TestCase, ALL_STRATEGIES,
};
use evmdiff::{apply, Account, Environment, Transaction, WorldState};

fn push0_cases() -> Vec<TestCase> {
    generate_test_cases(find_eip(3855).unwrap(), &ALL_STRATEGIES)
}

#[test]
fn native_fixture_layout() {
    let eip = find_eip(3855).unwrap();
    let fixture = native_fixture(eip, push0_cases());
    let value = serde_json::to_value(&fixture).unwrap();

    assert_eq!(value["eip_number"], 3855);
    assert_eq!(value["eip_title"], "PUSH0 instruction");
    assert!(value["generated_at"].is_u64());

    let cases = value["test_cases"].as_array().unwrap();
    assert!(!cases.is_empty());

    for case in cases {
        let object = case.as_object().unwrap();
        for key in [
            "name",
            "strategy",
            "bytecode",
            "gas_limit",
            "expected_success",
            "expected_gas_used",
            "description",
        ] {
            assert!(object.contains_key(key), "missing {key}");
        }
        // No leaked fields beyond the documented seven.
        assert_eq!(object.len(), 7);

        let bytecode = case["bytecode"].as_str().unwrap();
        assert!(!bytecode.starts_with("0x"));
        assert!(bytecode
            .chars()
            .all(|c| c.is_ascii_digit() || ('a'..='f').contains(&c)));
        assert!(case["gas_limit"].is_u64());
        assert!(case["expected_gas_used"].is_u64() || case["expected_gas_used"].is_null());
    }

    let strategies: Vec<_> = cases
        .iter()
        .map(|c| c["strategy"].as_str().unwrap().to_string())
        .collect();
    for name in [
        "BOUNDARY",
        "OPCODE_INTERACTION",
        "CALL_CONTEXT",
        "GAS_EXHAUSTION",
        "FORK_BOUNDARY",
        "STACK_DEPTH",
    ] {
        assert!(strategies.iter().any(|s| s == name), "missing {name}");
    }
}

#[test]
fn ecosystem_fixture_layout() {
    let cases = push0_cases();
    let fixture = ecosystem_fixture(&cases);
    let value = serde_json::to_value(&fixture).unwrap();
    let (sender, target, _) = fixture_addresses();

    assert_eq!(fixture.len(), cases.len());

    for case in &cases {
        let entry = &value[&case.name];

        let env = entry["env"].as_object().unwrap();
        for key in ["currentNumber", "currentGasLimit", "currentTimestamp"] {
            let field = env[key].as_str().unwrap();
            assert!(field.starts_with("0x"), "{key} must be hex");
        }

        let pre = entry["pre"].as_object().unwrap();
        let sender_key = format!("0x{}", hex::encode(sender.0));
        let target_key = format!("0x{}", hex::encode(target.0));
        assert!(pre.contains_key(&sender_key));
        assert!(pre.contains_key(&target_key));

        let account = pre[&target_key].as_object().unwrap();
        for key in ["balance", "code", "nonce", "storage"] {
            assert!(account.contains_key(key));
        }
        assert_eq!(
            account["code"].as_str().unwrap(),
            format!("0x{}", hex::encode(&case.bytecode))
        );

        let tx = entry["transaction"].as_object().unwrap();
        assert_eq!(tx["to"].as_str().unwrap(), target_key);
        assert_eq!(
            tx["gasLimit"].as_str().unwrap(),
            format!("0x{:x}", case.gas_limit)
        );
        assert_eq!(tx["data"].as_str().unwrap(), "0x");
    }
}

#[test]
fn generated_cases_replay_as_predicted() {
    let (sender, target, _) = fixture_addresses();

    for case in push0_cases() {
        let mut world = WorldState::new();
        world.insert_account(
            sender,
            Account {
                balance: U256::exp10(18),
                ..Default::default()
            },
        );
        world.insert_account(
            target,
            Account {
                nonce: 1,
                code: case.bytecode.clone().into(),
                ..Default::default()
            },
        );
        for (address, code) in &case.pre_accounts {
            world.insert_account(
                *address,
                Account {
                    nonce: 1,
                    code: code.clone(),
                    ..Default::default()
                },
            );
        }

        let tx = Transaction {
            sender,
            to: Some(target),
            value: U256::zero(),
            data: Bytes::new(),
            gas_limit: case.gas_limit,
            gas_price: U256::zero(),
            nonce: 0,
        };

        let result = apply(&mut world, &Environment::default(), &tx, case.revision).unwrap();

        assert_eq!(
            result.success, case.expected_success,
            "{}: {}",
            case.name, case.description
        );
        if let Some(expected_gas) = case.expected_gas_used {
            assert_eq!(result.gas_used, expected_gas, "{}", case.name);
        }
    }
}

#[test]
fn catalog_covers_every_revision_transition() {
    use evmdiff::eips::EIP_CATALOG;
    use evmdiff::Revision;

    for revision in [Revision::Homestead, Revision::Shanghai] {
        assert!(
            EIP_CATALOG.iter().any(|e| e.introduced_in_fork == revision),
            "no catalog entry introduces {revision}"
        );
    }
}
