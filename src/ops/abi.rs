//! Minimal view of a class ABI: entry point names and constructor width

use serde::Deserialize;
use serde_json::Value;
use std::collections::{HashMap, HashSet};

/// Struct nesting followed when sizing constructor inputs
const MAX_TYPE_DEPTH: usize = 8;

#[derive(Debug, Deserialize)]
struct AbiParam {
    #[serde(rename = "type")]
    ty: String,
}

#[derive(Debug, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
enum AbiItem {
    Function {
        name: String,
    },
    Interface {
        #[serde(default)]
        items: Vec<AbiItem>,
    },
    Constructor {
        #[serde(default)]
        inputs: Vec<AbiParam>,
    },
    Struct {
        name: String,
        #[serde(default)]
        members: Vec<AbiParam>,
    },
    #[serde(other)]
    Other,
}

/// Entry points and constructor shape of a declared class
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ContractAbi {
    functions: HashSet<String>,
    constructor_inputs: Vec<String>,
    structs: HashMap<String, Vec<String>>,
}

impl ContractAbi {
    /// Read the ABI out of a class definition returned by the node.
    /// `None` when the class carries no ABI this parser understands.
    pub fn from_class(class: &Value) -> Option<Self> {
        let items: Vec<AbiItem> = match class.get("abi")? {
            Value::String(raw) => serde_json::from_str(raw).ok()?,
            array @ Value::Array(_) => serde_json::from_value(array.clone()).ok()?,
            _ => return None,
        };

        let mut abi = ContractAbi::default();
        abi.collect(items);
        Some(abi)
    }

    fn collect(&mut self, items: Vec<AbiItem>) {
        for item in items {
            match item {
                AbiItem::Function { name } => {
                    self.functions.insert(name);
                }
                AbiItem::Interface { items } => self.collect(items),
                AbiItem::Constructor { inputs } => {
                    self.constructor_inputs = inputs.into_iter().map(|p| p.ty).collect();
                }
                AbiItem::Struct { name, members } => {
                    self.structs
                        .insert(name, members.into_iter().map(|m| m.ty).collect());
                }
                AbiItem::Other => {}
            }
        }
    }

    pub fn has_entrypoint(&self, name: &str) -> bool {
        self.functions.contains(name)
    }

    /// Number of calldata values the constructor consumes, or `None` when an
    /// input has a variable width (arrays, enums, tuples)
    pub fn constructor_felt_arity(&self) -> Option<usize> {
        self.constructor_inputs
            .iter()
            .map(|ty| self.type_width(ty, 0))
            .sum()
    }

    fn type_width(&self, ty: &str, depth: usize) -> Option<usize> {
        if depth > MAX_TYPE_DEPTH || ty.contains('<') || ty.starts_with('(') {
            return None;
        }

        let short_name = ty.rsplit("::").next().unwrap_or(ty);
        match short_name {
            "felt252" | "felt" | "bool" | "u8" | "u16" | "u32" | "u64" | "u128" | "i8" | "i16"
            | "i32" | "i64" | "i128" | "ContractAddress" | "ClassHash" | "EthAddress"
            | "StorageAddress" | "bytes31" => Some(1),
            "u256" => Some(2),
            _ => self
                .structs
                .get(ty)?
                .iter()
                .map(|member| self.type_width(member, depth + 1))
                .sum(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::codec::class::fixtures::mapa_abi;
    use serde_json::json;

    fn class_with_abi(abi: Value) -> Value {
        json!({
            "sierra_program": [],
            "contract_class_version": "0.1.0",
            "entry_points_by_type": {"EXTERNAL": [], "L1_HANDLER": [], "CONSTRUCTOR": []},
            "abi": abi.to_string()
        })
    }

    #[test]
    fn test_interface_functions() {
        let abi = ContractAbi::from_class(&class_with_abi(mapa_abi())).unwrap();
        assert!(abi.has_entrypoint("put"));
        assert!(abi.has_entrypoint("get"));
        assert!(!abi.has_entrypoint("delete"));
        assert_eq!(abi.constructor_felt_arity(), Some(0));
    }

    #[test]
    fn test_constructor_widths() {
        let abi = json!([
            {"type": "struct", "name": "demo::Pair", "members": [
                {"name": "a", "type": "core::felt252"},
                {"name": "b", "type": "core::integer::u256"}
            ]},
            {"type": "constructor", "name": "constructor", "inputs": [
                {"name": "owner", "type": "core::starknet::contract_address::ContractAddress"},
                {"name": "supply", "type": "core::integer::u256"},
                {"name": "pair", "type": "demo::Pair"}
            ]}
        ]);
        let class = json!({"abi": abi});
        let abi = ContractAbi::from_class(&class).unwrap();
        assert_eq!(abi.constructor_felt_arity(), Some(6));
    }

    #[test]
    fn test_variable_width_constructor() {
        let abi = json!([
            {"type": "constructor", "name": "constructor", "inputs": [
                {"name": "names", "type": "core::array::Array::<core::felt252>"}
            ]}
        ]);
        let abi = ContractAbi::from_class(&class_with_abi(abi)).unwrap();
        assert_eq!(abi.constructor_felt_arity(), None);

        let unknown = json!([
            {"type": "constructor", "name": "constructor", "inputs": [
                {"name": "mode", "type": "demo::Mode"}
            ]}
        ]);
        let abi = ContractAbi::from_class(&class_with_abi(unknown)).unwrap();
        assert_eq!(abi.constructor_felt_arity(), None);
    }

    #[test]
    fn test_missing_abi() {
        assert!(ContractAbi::from_class(&json!({"sierra_program": []})).is_none());
        assert!(ContractAbi::from_class(&json!({"abi": "not json"})).is_none());
    }
}
