//! Contract class artifacts and their hashes
//!
//! A declarable class is a pair of Scarb artifacts: the Sierra class
//! (`*.contract_class.json`) that is sent to the node, and the CASM class
//! (`*.compiled_contract_class.json`) whose hash the declaration commits to.

use super::address::normalize_address;
use super::felt::{serde_hex, serde_hex_vec, short_string, short_string_const, FeltError};
use crate::types::ClassHash;

use serde::{Deserialize, Serialize};
use starknet_crypto::{poseidon_hash_many, FieldElement, PoseidonHasher};
use std::path::{Path, PathBuf};
use thiserror::Error;

const SIERRA_SUFFIX: &str = ".contract_class.json";
const CASM_SUFFIX: &str = ".compiled_contract_class.json";
const SUPPORTED_CLASS_VERSION: &str = "0.1.0";

/// Errors raised while loading or hashing class artifacts
#[derive(Error, Debug)]
pub enum ClassError {
    #[error("Failed to read artifact {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Invalid artifact {path}: {message}")]
    Invalid { path: PathBuf, message: String },

    #[error("No artifacts for contract '{name}' in {dir}")]
    NotFound { name: String, dir: PathBuf },

    #[error("Contract name '{name}' matches several artifacts in {dir}")]
    Ambiguous { name: String, dir: PathBuf },

    #[error("Unsupported contract class version {0}")]
    UnsupportedVersion(String),

    #[error("Invalid builtin name: {0}")]
    Builtin(#[from] FeltError),

    #[error("Failed to serialize ABI: {0}")]
    Abi(String),
}

/// Where to find a class to declare
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ClassSource {
    /// Explicit artifact paths
    Artifacts { sierra: PathBuf, casm: PathBuf },
    /// Contract name looked up in a Scarb target directory
    Named { name: String, target_dir: PathBuf },
}

impl ClassSource {
    pub fn named(name: impl Into<String>, target_dir: impl Into<PathBuf>) -> Self {
        ClassSource::Named {
            name: name.into(),
            target_dir: target_dir.into(),
        }
    }

    pub fn artifacts(sierra: impl Into<PathBuf>, casm: impl Into<PathBuf>) -> Self {
        ClassSource::Artifacts {
            sierra: sierra.into(),
            casm: casm.into(),
        }
    }

    /// Resolve to the Sierra and CASM artifact paths
    pub fn resolve(&self) -> Result<(PathBuf, PathBuf), ClassError> {
        match self {
            ClassSource::Artifacts { sierra, casm } => Ok((sierra.clone(), casm.clone())),
            ClassSource::Named { name, target_dir } => find_artifacts(name, target_dir),
        }
    }
}

/// Scarb names artifacts `<package>_<contract>.contract_class.json`
fn find_artifacts(name: &str, dir: &Path) -> Result<(PathBuf, PathBuf), ClassError> {
    let entries = std::fs::read_dir(dir).map_err(|source| ClassError::Io {
        path: dir.to_path_buf(),
        source,
    })?;

    let exact = format!("{}{}", name, SIERRA_SUFFIX);
    let scoped = format!("_{}{}", name, SIERRA_SUFFIX);
    let mut matches: Vec<PathBuf> = entries
        .filter_map(|entry| entry.ok())
        .map(|entry| entry.path())
        .filter(|path| {
            path.file_name()
                .and_then(|f| f.to_str())
                .map(|f| f == exact || f.ends_with(&scoped))
                .unwrap_or(false)
        })
        .collect();
    matches.sort();

    let sierra = match matches.len() {
        0 => {
            return Err(ClassError::NotFound {
                name: name.to_string(),
                dir: dir.to_path_buf(),
            })
        }
        1 => matches.remove(0),
        _ => {
            return Err(ClassError::Ambiguous {
                name: name.to_string(),
                dir: dir.to_path_buf(),
            })
        }
    };

    let stem = sierra
        .file_name()
        .and_then(|f| f.to_str())
        .and_then(|f| f.strip_suffix(SIERRA_SUFFIX))
        .unwrap_or(name)
        .to_string();
    let casm = dir.join(format!("{}{}", stem, CASM_SUFFIX));
    if !casm.exists() {
        return Err(ClassError::NotFound {
            name: format!("{} (compiled class)", name),
            dir: dir.to_path_buf(),
        });
    }

    Ok((sierra, casm))
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SierraEntryPoint {
    #[serde(with = "serde_hex")]
    pub selector: FieldElement,
    pub function_idx: u64,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SierraEntryPoints {
    #[serde(rename = "EXTERNAL", default)]
    pub external: Vec<SierraEntryPoint>,
    #[serde(rename = "L1_HANDLER", default)]
    pub l1_handler: Vec<SierraEntryPoint>,
    #[serde(rename = "CONSTRUCTOR", default)]
    pub constructor: Vec<SierraEntryPoint>,
}

/// Sierra class in the shape the node accepts for DECLARE
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct FlattenedSierraClass {
    #[serde(with = "serde_hex_vec")]
    pub sierra_program: Vec<FieldElement>,
    pub contract_class_version: String,
    pub entry_points_by_type: SierraEntryPoints,
    pub abi: String,
}

#[derive(Debug, Deserialize)]
struct SierraArtifact {
    #[serde(with = "serde_hex_vec")]
    sierra_program: Vec<FieldElement>,
    contract_class_version: String,
    entry_points_by_type: SierraEntryPoints,
    abi: serde_json::Value,
}

#[derive(Debug, Deserialize)]
struct CasmEntryPoint {
    #[serde(with = "serde_hex")]
    selector: FieldElement,
    offset: u64,
    #[serde(default)]
    builtins: Vec<String>,
}

#[derive(Debug, Default, Deserialize)]
struct CasmEntryPoints {
    #[serde(rename = "EXTERNAL", default)]
    external: Vec<CasmEntryPoint>,
    #[serde(rename = "L1_HANDLER", default)]
    l1_handler: Vec<CasmEntryPoint>,
    #[serde(rename = "CONSTRUCTOR", default)]
    constructor: Vec<CasmEntryPoint>,
}

/// Nested segment lengths emitted by newer compilers
#[derive(Debug, Clone, Deserialize)]
#[serde(untagged)]
enum SegmentLengths {
    Leaf(u64),
    Node(Vec<SegmentLengths>),
}

#[derive(Debug, Deserialize)]
struct CasmArtifact {
    #[serde(with = "serde_hex_vec")]
    bytecode: Vec<FieldElement>,
    #[serde(default)]
    bytecode_segment_lengths: Option<SegmentLengths>,
    entry_points_by_type: CasmEntryPoints,
}

/// A class ready to be declared
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PreparedClass {
    pub class_hash: ClassHash,
    pub compiled_class_hash: FieldElement,
    pub definition: FlattenedSierraClass,
}

impl PreparedClass {
    /// Load and hash the artifacts behind `source`
    pub fn load(source: &ClassSource) -> Result<Self, ClassError> {
        let (sierra_path, casm_path) = source.resolve()?;
        let sierra = read_artifact(&sierra_path)?;
        let casm = read_artifact(&casm_path)?;
        Self::from_json(&sierra, &casm).map_err(|e| match e {
            // Point the error at the file it came from
            ClassError::Invalid { path, message } => ClassError::Invalid {
                path: if path == Path::new("casm") {
                    casm_path
                } else {
                    sierra_path
                },
                message,
            },
            other => other,
        })
    }

    /// Build from the raw JSON of both artifacts
    pub fn from_json(sierra_json: &str, casm_json: &str) -> Result<Self, ClassError> {
        let sierra: SierraArtifact =
            serde_json::from_str(sierra_json).map_err(|e| invalid("sierra", e))?;
        let casm: CasmArtifact =
            serde_json::from_str(casm_json).map_err(|e| invalid("casm", e))?;

        if sierra.contract_class_version != SUPPORTED_CLASS_VERSION {
            return Err(ClassError::UnsupportedVersion(sierra.contract_class_version));
        }

        let abi = match sierra.abi {
            serde_json::Value::String(abi) => abi,
            other => serde_json_pythonic::to_string_pythonic(&other)
                .map_err(|e| ClassError::Abi(e.to_string()))?,
        };

        let definition = FlattenedSierraClass {
            sierra_program: sierra.sierra_program,
            contract_class_version: sierra.contract_class_version,
            entry_points_by_type: sierra.entry_points_by_type,
            abi,
        };

        Ok(Self {
            class_hash: sierra_class_hash(&definition),
            compiled_class_hash: compiled_class_hash(&casm)?,
            definition,
        })
    }
}

fn read_artifact(path: &Path) -> Result<String, ClassError> {
    std::fs::read_to_string(path).map_err(|source| ClassError::Io {
        path: path.to_path_buf(),
        source,
    })
}

fn invalid(kind: &str, error: serde_json::Error) -> ClassError {
    ClassError::Invalid {
        path: PathBuf::from(kind),
        message: error.to_string(),
    }
}

/// Class hash committed to by the Sierra definition
pub fn sierra_class_hash(class: &FlattenedSierraClass) -> ClassHash {
    let mut hasher = PoseidonHasher::new();
    hasher.update(short_string_const("CONTRACT_CLASS_V0.1.0"));
    hasher.update(hash_sierra_entry_points(&class.entry_points_by_type.external));
    hasher.update(hash_sierra_entry_points(&class.entry_points_by_type.l1_handler));
    hasher.update(hash_sierra_entry_points(&class.entry_points_by_type.constructor));
    hasher.update(super::felt::starknet_keccak(class.abi.as_bytes()));
    hasher.update(poseidon_hash_many(&class.sierra_program));
    ClassHash::new(normalize_address(hasher.finalize()))
}

fn hash_sierra_entry_points(entry_points: &[SierraEntryPoint]) -> FieldElement {
    let mut hasher = PoseidonHasher::new();
    for entry in entry_points {
        hasher.update(entry.selector);
        hasher.update(entry.function_idx.into());
    }
    hasher.finalize()
}

fn compiled_class_hash(casm: &CasmArtifact) -> Result<FieldElement, ClassError> {
    let mut hasher = PoseidonHasher::new();
    hasher.update(short_string_const("COMPILED_CLASS_V1"));
    hasher.update(hash_casm_entry_points(&casm.entry_points_by_type.external)?);
    hasher.update(hash_casm_entry_points(&casm.entry_points_by_type.l1_handler)?);
    hasher.update(hash_casm_entry_points(&casm.entry_points_by_type.constructor)?);
    hasher.update(bytecode_hash(&casm.bytecode, casm.bytecode_segment_lengths.as_ref())?);
    Ok(hasher.finalize())
}

fn hash_casm_entry_points(entry_points: &[CasmEntryPoint]) -> Result<FieldElement, ClassError> {
    let mut hasher = PoseidonHasher::new();
    for entry in entry_points {
        hasher.update(entry.selector);
        hasher.update(entry.offset.into());

        let mut builtins = PoseidonHasher::new();
        for builtin in &entry.builtins {
            builtins.update(short_string(builtin)?);
        }
        hasher.update(builtins.finalize());
    }
    Ok(hasher.finalize())
}

fn bytecode_hash(
    bytecode: &[FieldElement],
    segments: Option<&SegmentLengths>,
) -> Result<FieldElement, ClassError> {
    let Some(segments) = segments else {
        return Ok(poseidon_hash_many(bytecode));
    };

    let mut offset = 0;
    let (_, hash) = segment_hash(bytecode, segments, &mut offset)?;
    if offset != bytecode.len() {
        return Err(ClassError::Invalid {
            path: PathBuf::from("casm"),
            message: format!(
                "segment lengths cover {} of {} bytecode words",
                offset,
                bytecode.len()
            ),
        });
    }
    Ok(hash)
}

/// Leaves hash their words; nodes hash `(length, hash)` pairs plus one
fn segment_hash(
    bytecode: &[FieldElement],
    segments: &SegmentLengths,
    offset: &mut usize,
) -> Result<(usize, FieldElement), ClassError> {
    match segments {
        SegmentLengths::Leaf(length) => {
            let length = *length as usize;
            let end = *offset + length;
            let data = bytecode.get(*offset..end).ok_or_else(|| ClassError::Invalid {
                path: PathBuf::from("casm"),
                message: format!("segment {}..{} exceeds bytecode", offset, end),
            })?;
            *offset = end;
            Ok((length, poseidon_hash_many(data)))
        }
        SegmentLengths::Node(children) => {
            let mut hasher = PoseidonHasher::new();
            let mut total = 0;
            for child in children {
                let (length, hash) = segment_hash(bytecode, child, offset)?;
                hasher.update(length.into());
                hasher.update(hash);
                total += length;
            }
            Ok((total, hasher.finalize() + FieldElement::ONE))
        }
    }
}


#[cfg(test)]
mod tests {
    use super::fixtures::*;
    use super::*;
    use serde_json::json;

    #[test]
    fn test_class_hash_is_content_addressed() {
        let casm = casm_json(&["0xa"], None);
        let first = PreparedClass::from_json(&sierra_json(&["0x1", "0x2"], mapa_abi()), &casm).unwrap();
        let again = PreparedClass::from_json(&sierra_json(&["0x1", "0x2"], mapa_abi()), &casm).unwrap();
        let changed = PreparedClass::from_json(&sierra_json(&["0x1", "0x3"], mapa_abi()), &casm).unwrap();

        assert_eq!(first.class_hash, again.class_hash);
        assert_ne!(first.class_hash, changed.class_hash);
        assert_eq!(first.compiled_class_hash, changed.compiled_class_hash);
    }

    #[test]
    fn test_abi_uses_python_json_spacing() {
        let abi = json!([{"type": "function", "name": "get"}]);
        let as_string = json!("[{\"type\": \"function\", \"name\": \"get\"}]");
        let casm = casm_json(&["0xa"], None);

        let from_array = PreparedClass::from_json(&sierra_json(&["0x1"], abi), &casm).unwrap();
        let from_string = PreparedClass::from_json(&sierra_json(&["0x1"], as_string), &casm).unwrap();

        assert_eq!(from_array.definition.abi, "[{\"type\": \"function\", \"name\": \"get\"}]");
        assert_eq!(from_array.class_hash, from_string.class_hash);
    }

    /// Hashes of the Mapa fixture from an independent implementation of the
    /// class hash definition, seeded with the cairo-lang Poseidon round keys
    #[test]
    fn test_mapa_hashes_match_reference_values() {
        let felt = |hex: &str| FieldElement::from_hex_be(hex).unwrap();
        let sierra = sierra_json(&["0x1", "0x2", "0x3"], mapa_abi());

        let flat = PreparedClass::from_json(&sierra, &casm_json(&["0xa", "0xb", "0xc"], None)).unwrap();
        assert_eq!(
            crate::codec::felt::starknet_keccak(flat.definition.abi.as_bytes()),
            felt("0x56c4176116b57049e3a03e0317cf9b1ff0b00405ce1b12c2a179f4fb034f6a")
        );
        assert_eq!(
            flat.class_hash.felt(),
            felt("0x5efd1834afdd3f439476dec73d9bc39c0b55b17baee9cdcdd4cbe03d3f86cf2")
        );
        assert_eq!(
            flat.compiled_class_hash,
            felt("0x122fc520e412034554d0ebbbe3a82d10cdddfdd0276b48a67a1d0a5f23e09f2")
        );

        let segmented = PreparedClass::from_json(
            &sierra,
            &casm_json(&["0xa", "0xb", "0xc"], Some(json!([1, [1, 1]]))),
        )
        .unwrap();
        assert_eq!(
            segmented.compiled_class_hash,
            felt("0x615f6a0ff98d188af51e00ce216d09f2c96204dd7a12702e7a95c6eaa906f53")
        );
    }

    #[test]
    fn test_class_hash_is_in_address_range() {
        let class = PreparedClass::from_json(
            &sierra_json(&["0x1"], mapa_abi()),
            &casm_json(&["0xa"], None),
        )
        .unwrap();
        assert!(class.class_hash.felt() < *crate::codec::address::ADDR_BOUND);
    }

    #[test]
    fn test_segmented_bytecode_hash() {
        let one = FieldElement::ONE;
        let two = FieldElement::TWO;
        let three = FieldElement::THREE;

        let flat = bytecode_hash(&[one, two, three], None).unwrap();
        assert_eq!(flat, poseidon_hash_many(&[one, two, three]));

        let segments = SegmentLengths::Node(vec![SegmentLengths::Leaf(1), SegmentLengths::Leaf(2)]);
        let segmented = bytecode_hash(&[one, two, three], Some(&segments)).unwrap();
        let expected = poseidon_hash_many(&[
            FieldElement::ONE,
            poseidon_hash_many(&[one]),
            FieldElement::TWO,
            poseidon_hash_many(&[two, three]),
        ]) + FieldElement::ONE;
        assert_eq!(segmented, expected);

        let short = SegmentLengths::Node(vec![SegmentLengths::Leaf(1)]);
        assert!(matches!(
            bytecode_hash(&[one, two], Some(&short)),
            Err(ClassError::Invalid { .. })
        ));

        let long = SegmentLengths::Node(vec![SegmentLengths::Leaf(4)]);
        assert!(bytecode_hash(&[one, two], Some(&long)).is_err());
    }

    #[test]
    fn test_segment_lengths_parse_from_artifact() {
        let sierra = sierra_json(&["0x1"], mapa_abi());
        let segmented = casm_json(&["0xa", "0xb", "0xc"], Some(json!([1, [1, 1]])));
        let flat = casm_json(&["0xa", "0xb", "0xc"], None);

        let a = PreparedClass::from_json(&sierra, &segmented).unwrap();
        let b = PreparedClass::from_json(&sierra, &flat).unwrap();
        assert_eq!(a.class_hash, b.class_hash);
        assert_ne!(a.compiled_class_hash, b.compiled_class_hash);
    }

    #[test]
    fn test_rejects_unknown_class_version() {
        let sierra = sierra_json(&["0x1"], mapa_abi()).replace("\"0.1.0\"", "\"0.2.0\"");
        assert!(matches!(
            PreparedClass::from_json(&sierra, &casm_json(&["0xa"], None)),
            Err(ClassError::UnsupportedVersion(_))
        ));
    }

    #[test]
    fn test_rejects_malformed_artifact() {
        assert!(matches!(
            PreparedClass::from_json("{\"sierra_program\": 1}", &casm_json(&["0xa"], None)),
            Err(ClassError::Invalid { .. })
        ));
    }

    #[test]
    fn test_named_lookup_in_target_dir() {
        let dir = tempfile::tempdir().unwrap();
        let (sierra, casm) = write_mapa_artifacts(dir.path());

        let source = ClassSource::named("Mapa", dir.path());
        assert_eq!(source.resolve().unwrap(), (sierra, casm));

        let loaded = PreparedClass::load(&source).unwrap();
        let direct = PreparedClass::from_json(
            &sierra_json(&["0x1", "0x2", "0x3"], mapa_abi()),
            &casm_json(&["0xa", "0xb", "0xc"], None),
        )
        .unwrap();
        assert_eq!(loaded, direct);

        assert!(matches!(
            ClassSource::named("Missing", dir.path()).resolve(),
            Err(ClassError::NotFound { .. })
        ));
    }

    #[test]
    fn test_missing_compiled_artifact() {
        let dir = tempfile::tempdir().unwrap();
        let (_, casm) = write_mapa_artifacts(dir.path());
        std::fs::remove_file(casm).unwrap();

        assert!(matches!(
            ClassSource::named("Mapa", dir.path()).resolve(),
            Err(ClassError::NotFound { .. })
        ));
    }
}
