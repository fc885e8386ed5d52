//! Generated code compiled and run inside a throwaway crate.
//!
//! The fixture crate depends on a minimal `netabase_model` contract crate and
//! includes the generated file as a module; its own test exercises the
//! emitted accessors through `cargo test`.

mod common;

use std::process::Command;

use common::Workspace;
use netabase_codegen::generate;

const CONTRACT: &str = r#"
use std::any::Any;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ModelError {
    UnknownField { model: String, index: usize },
    InvalidType { model: String, index: usize },
    InvalidValue { model: String, index: usize, message: String },
    Unsupported { model: String, index: usize, operation: String },
}

impl ModelError {
    pub fn unknown_field(model: &str, index: usize) -> Self {
        Self::UnknownField { model: model.into(), index }
    }
    pub fn invalid_type(model: &str, index: usize) -> Self {
        Self::InvalidType { model: model.into(), index }
    }
    pub fn invalid_value(model: &str, index: usize, message: impl std::fmt::Display) -> Self {
        Self::InvalidValue { model: model.into(), index, message: message.to_string() }
    }
    pub fn unsupported(model: &str, index: usize, operation: &str) -> Self {
        Self::Unsupported { model: model.into(), index, operation: operation.into() }
    }
}

pub trait Model {
    fn model_name(&self) -> &'static str;
    fn field_names(&self) -> &'static [&'static str];
    fn is_primary_key_zero(&self) -> bool;
    fn primary_key_value(&self) -> &dyn Any;
    fn set_primary_key_value(&mut self, value: &dyn Any) -> Result<(), ModelError>;
    fn primary_key_string(&self) -> String;
    fn set_primary_key_string(&mut self, value: &str) -> Result<(), ModelError>;
}

pub trait Fielder {
    fn field_value(&self, index: usize) -> Result<&dyn Any, ModelError>;
    fn set_field_value(&mut self, index: usize, value: &dyn Any) -> Result<(), ModelError>;
    fn is_field_zero(&self, index: usize) -> Result<bool, ModelError>;
    fn set_field_zero(&mut self, index: usize) -> Result<(), ModelError>;
    fn hashable_field_value(&self, index: usize) -> Result<Box<dyn Any>, ModelError>;
    fn field_string(&self, index: usize) -> Result<String, ModelError>;
    fn set_field_string(&mut self, index: usize, value: &str) -> Result<(), ModelError>;
}

pub trait SingleRelationer {
    fn relation_model(&self, index: usize) -> Result<Option<&dyn Any>, ModelError>;
    fn set_relation_model(&mut self, index: usize, model: Box<dyn Any>) -> Result<(), ModelError>;
}

pub trait MultiRelationer {
    fn relation_models(&self, index: usize) -> Result<Vec<&dyn Any>, ModelError>;
    fn relation_model_at(&self, index: usize, position: usize) -> Result<Option<&dyn Any>, ModelError>;
    fn relation_len(&self, index: usize) -> Result<usize, ModelError>;
    fn add_relation_model(&mut self, index: usize, model: Box<dyn Any>) -> Result<(), ModelError>;
    fn set_relation_models(&mut self, index: usize, models: Vec<Box<dyn Any>>) -> Result<(), ModelError>;
    fn relation_join(&self, index: usize) -> Option<&'static str>;
}
"#;

const MODELS: &str = r#"
#[path = "generated/bank/models.rs"]
pub mod generated;

#[derive(Debug, Default, Clone, PartialEq)]
pub struct Score(pub i32);

#[derive(Debug, Default, Clone, PartialEq)]
pub struct Account {
    pub id: [u8; 4],
    pub name: String,
    pub balance: f64,
    pub active: bool,
    pub grade: char,
    pub visits: u64,
    pub delta: i16,
    pub score: Score,
    pub nickname: Option<String>,
    pub avatar: Vec<u8>,
}

#[derive(Debug, Default, Clone)]
pub struct Branch {
    pub id: u32,
    pub accounts: Vec<Account>,
}
"#;

const ROUND_TRIPS: &str = r#"
use bank::{Account, Branch, Score};
use netabase_model::{Fielder, Model, ModelError, MultiRelationer};

fn sample() -> Account {
    Account {
        id: [0xde, 0xad, 0x00, 0x0f],
        name: "Ada, Lovelace".into(),
        balance: -12.5,
        active: true,
        grade: 'é',
        visits: u64::MAX,
        delta: i16::MIN,
        score: Score(-7),
        nickname: Some("ada".into()),
        avatar: b"hi".to_vec(),
    }
}

#[test]
fn every_field_survives_its_string_form() {
    let original = sample();
    let mut copy = Account::default();
    assert!(copy.is_primary_key_zero());
    for index in 0..original.field_names().len() {
        let text = original.field_string(index).unwrap();
        copy.set_field_string(index, &text).unwrap();
    }
    assert_eq!(copy, original);
    assert_eq!(original.primary_key_string(), "dead000f");
    assert!(!copy.is_primary_key_zero());
}

#[test]
fn hex_primary_rejects_malformed_text() {
    let mut account = sample();
    assert!(account.set_primary_key_string("+ead000f").is_err());
    assert!(account.set_primary_key_string("dead00").is_err());
    assert!(account.set_primary_key_string("DEAD000G").is_err());
    account.set_primary_key_string("0102abff").unwrap();
    assert_eq!(account.id, [0x01, 0x02, 0xab, 0xff]);
}

#[test]
fn empty_text_clears_optional_fields() {
    let mut account = sample();
    account.set_field_string(8, "").unwrap();
    assert_eq!(account.nickname, None);
    assert_eq!(account.field_string(8).unwrap(), "");
}

#[test]
fn values_accept_alternate_types() {
    let mut account = Account::default();
    account.set_field_value(5, &7u8).unwrap();
    account.set_field_value(7, &3i64).unwrap();
    account.set_field_value(9, &"yo".to_string()).unwrap();
    account.set_field_value(1, &b"bytes".to_vec()).unwrap();
    assert_eq!(account.visits, 7);
    assert_eq!(account.score, Score(3));
    assert_eq!(account.avatar, b"yo");
    assert_eq!(account.name, "bytes");
    assert!(matches!(
        account.set_field_value(3, &1u8),
        Err(ModelError::InvalidType { index: 3, .. })
    ));
    assert!(matches!(account.field_string(42), Err(ModelError::UnknownField { index: 42, .. })));
}

#[test]
fn zero_values_reset_fields() {
    let mut account = sample();
    for index in 0..account.field_names().len() {
        account.set_field_zero(index).unwrap();
        assert!(account.is_field_zero(index).unwrap());
    }
    assert_eq!(account, Account::default());
}

#[test]
fn multi_relations_grow_and_validate() {
    let mut branch = Branch::default();
    branch.add_relation_model(1, Box::new(sample())).unwrap();
    assert_eq!(branch.relation_len(1).unwrap(), 1);
    let first = branch.relation_model_at(1, 0).unwrap().unwrap();
    assert_eq!(first.downcast_ref::<Account>().unwrap().name, "Ada, Lovelace");
    assert!(branch.relation_model_at(1, 5).unwrap().is_none());
    assert!(branch.add_relation_model(1, Box::new(5u8)).is_err());
    assert_eq!(branch.relation_join(1), None);
}

#[test]
fn registry_lists_every_model() {
    let names: Vec<&str> = bank::generated::registered_models()
        .iter()
        .map(|m| m.model_name())
        .collect();
    assert_eq!(names, ["Account", "Branch"]);
}
"#;

#[test]
fn generated_accessors_compile_and_round_trip() {
    let ws = Workspace::new();
    ws.write(
        "netabase_model/Cargo.toml",
        "[package]\nname = \"netabase_model\"\nversion = \"0.1.0\"\nedition = \"2024\"\n\n[workspace]\n",
    );
    ws.write("netabase_model/src/lib.rs", CONTRACT);
    ws.write(
        "bank/Cargo.toml",
        "[package]\nname = \"bank\"\nversion = \"0.1.0\"\nedition = \"2024\"\n\n[workspace]\n\n\
         [dependencies]\nnetabase_model = { path = \"../netabase_model\" }\n",
    );
    ws.write("bank/src/lib.rs", MODELS);
    ws.write("bank/tests/round_trips.rs", ROUND_TRIPS);

    let root = ws.path("bank");
    let mut config = ws.config(&root);
    config.output_dir = root.join("src/generated");
    let report = generate(&config).unwrap();
    assert_eq!(report.entities, 2);
    assert!(report.skipped_string_fields.is_empty());

    let output = Command::new(env!("CARGO"))
        .args(["test", "--offline", "--quiet"])
        .current_dir(&root)
        .env("CARGO_TARGET_DIR", ws.path("target"))
        .output()
        .expect("spawning cargo");
    assert!(
        output.status.success(),
        "cargo test failed:\n{}\n{}",
        String::from_utf8_lossy(&output.stdout),
        String::from_utf8_lossy(&output.stderr)
    );
}
