//! Contract compliance: the on-disk JSON form of module records.

use bytecode_system::{ModuleRecord, Opcode, Section};

/// Contract: a hand-written record using every container section loads.
#[test]
fn contract_hand_written_record() {
    let json = r#"{
        "constants": ["value"],
        "sections": [
            { "section": "module", "name": "app", "version": 2 },
            { "section": "dependency", "name": "lib" },
            { "section": "class", "name": { "name": "Box" }, "num_type_props": 1,
              "base": { "name": { "name": "Object" } } },
            { "section": "function", "name": { "name": "get" }, "slot": 0,
              "code": { "instructions": [
                  { "opcode": { "GetThisSlot": 0 }, "line": 4 },
                  { "opcode": "ReturnValue" }
              ] } },
            { "section": "function-end" },
            { "section": "block", "name": { "name": "instance" }, "instance": true, "num_slots": 1 },
            { "section": "property", "name": { "name": "value" }, "slot": 0,
              "value": { "number": 3.0 } },
            { "section": "block-end" },
            { "section": "class-end" },
            { "section": "doc", "text": "A box." },
            { "section": "module-end" }
        ]
    }"#;
    let record = ModuleRecord::from_json(json).unwrap();
    assert!(record.validate().is_ok());
    assert_eq!(record.dependencies(), vec!["lib".to_string()]);
    let code = record
        .sections
        .iter()
        .find_map(|s| match s {
            Section::Function(f) => f.code.clone(),
            _ => None,
        })
        .unwrap();
    assert_eq!(code.opcode(0), Some(&Opcode::GetThisSlot(0)));
    assert_eq!(code.line_at(1), 4);
}

/// Contract: struct-like opcodes use field names in JSON.
#[test]
fn contract_opcode_json_shape() {
    let json = serde_json::to_string(&Opcode::CallGlobalSlot { slot: 3, argc: 1 }).unwrap();
    assert_eq!(json, r#"{"CallGlobalSlot":{"slot":3,"argc":1}}"#);
}
