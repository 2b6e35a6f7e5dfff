use std::collections::HashSet;
use std::fmt;
use std::fs;
use std::path::{Path, PathBuf};

use roxmltree::{Document, Node};

use super::room::Vec3;

/// An item or check recorded at a fixed spot in one scene.
#[derive(Debug, Clone, PartialEq)]
pub struct PlacementRecord {
    pub name: String,
    pub scene: String,
    pub position: Vec3,
    pub size: Option<Vec3>,
}

/// A randomizer transition: the connector object it leaves through and where it leads.
#[derive(Debug, Clone, PartialEq)]
pub struct TransitionRecord {
    pub name: String,
    pub scene: String,
    pub door_name: String,
    pub target: String,
}

#[derive(Debug, Clone, Default)]
pub struct PlacementIndex {
    records: Vec<PlacementRecord>,
}

impl PlacementIndex {
    pub fn from_records(records: Vec<PlacementRecord>) -> Self {
        Self { records }
    }

    pub fn load_xml(path: &Path) -> Result<Self, IndexLoadError> {
        let raw = read_index_file(path)?;
        Self::parse_xml(path, &raw)
    }

    pub fn parse_xml(file_path: &Path, raw: &str) -> Result<Self, IndexLoadError> {
        let doc = parse_document(file_path, raw)?;
        let nodes = record_nodes(file_path, &doc, "Items", "item")?;
        let mut records = Vec::with_capacity(nodes.len());
        let mut seen_names = HashSet::<String>::new();
        for node in nodes {
            let record = parse_placement(file_path, &doc, node)?;
            if !seen_names.insert(record.name.clone()) {
                return Err(error_at_node(
                    IndexErrorCode::DuplicateRecord,
                    format!("duplicate item name '{}'", record.name),
                    file_path,
                    &doc,
                    node,
                ));
            }
            records.push(record);
        }
        Ok(Self { records })
    }

    pub fn records(&self) -> &[PlacementRecord] {
        &self.records
    }

    pub fn in_scene<'a>(&'a self, scene: &'a str) -> impl Iterator<Item = &'a PlacementRecord> {
        self.records.iter().filter(move |record| record.scene == scene)
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }
}

#[derive(Debug, Clone, Default)]
pub struct TransitionIndex {
    records: Vec<TransitionRecord>,
}

impl TransitionIndex {
    pub fn from_records(records: Vec<TransitionRecord>) -> Self {
        Self { records }
    }

    pub fn load_xml(path: &Path) -> Result<Self, IndexLoadError> {
        let raw = read_index_file(path)?;
        Self::parse_xml(path, &raw)
    }

    pub fn parse_xml(file_path: &Path, raw: &str) -> Result<Self, IndexLoadError> {
        let doc = parse_document(file_path, raw)?;
        let nodes = record_nodes(file_path, &doc, "Transitions", "transition")?;
        let mut records = Vec::with_capacity(nodes.len());
        let mut seen_names = HashSet::<String>::new();
        for node in nodes {
            let record = parse_transition(file_path, &doc, node)?;
            if !seen_names.insert(record.name.clone()) {
                return Err(error_at_node(
                    IndexErrorCode::DuplicateRecord,
                    format!("duplicate transition name '{}'", record.name),
                    file_path,
                    &doc,
                    node,
                ));
            }
            records.push(record);
        }
        Ok(Self { records })
    }

    pub fn records(&self) -> &[TransitionRecord] {
        &self.records
    }

    pub fn in_scene<'a>(&'a self, scene: &'a str) -> impl Iterator<Item = &'a TransitionRecord> {
        self.records.iter().filter(move |record| record.scene == scene)
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SourceLocation {
    pub line: usize,
    pub column: usize,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IndexErrorCode {
    ReadFile,
    XmlMalformed,
    InvalidRoot,
    UnknownElement,
    UnknownField,
    DuplicateField,
    MissingField,
    InvalidValue,
    DuplicateRecord,
}

#[derive(Debug, Clone)]
pub struct IndexLoadError {
    pub code: IndexErrorCode,
    pub message: String,
    pub file_path: PathBuf,
    pub location: Option<SourceLocation>,
}

impl fmt::Display for IndexLoadError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.location {
            Some(loc) => write!(
                f,
                "{:?}: {} (file={}, line={}, column={})",
                self.code,
                self.message,
                self.file_path.display(),
                loc.line,
                loc.column
            ),
            None => write!(
                f,
                "{:?}: {} (file={})",
                self.code,
                self.message,
                self.file_path.display()
            ),
        }
    }
}

impl std::error::Error for IndexLoadError {}

fn read_index_file(path: &Path) -> Result<String, IndexLoadError> {
    fs::read_to_string(path).map_err(|source| IndexLoadError {
        code: IndexErrorCode::ReadFile,
        message: format!("failed to read index file: {source}"),
        file_path: path.to_path_buf(),
        location: None,
    })
}

fn parse_document<'input>(
    file_path: &Path,
    raw: &'input str,
) -> Result<Document<'input>, IndexLoadError> {
    Document::parse(raw).map_err(|error| IndexLoadError {
        code: IndexErrorCode::XmlMalformed,
        message: format!("malformed XML: {error}"),
        file_path: file_path.to_path_buf(),
        location: Some(SourceLocation {
            line: error.pos().row as usize,
            column: error.pos().col as usize,
        }),
    })
}

fn record_nodes<'a, 'input>(
    file_path: &Path,
    doc: &'a Document<'input>,
    root_name: &str,
    record_name: &str,
) -> Result<Vec<Node<'a, 'input>>, IndexLoadError> {
    let root = doc.root_element();
    if root.tag_name().name() != root_name {
        return Err(error_at_node(
            IndexErrorCode::InvalidRoot,
            format!("root element must be <{root_name}>"),
            file_path,
            doc,
            root,
        ));
    }

    let mut nodes = Vec::new();
    for child in root.children().filter(|node| node.is_element()) {
        if child.tag_name().name() != record_name {
            return Err(error_at_node(
                IndexErrorCode::UnknownElement,
                format!(
                    "unexpected <{}> in <{root_name}>; expected <{record_name}>",
                    child.tag_name().name()
                ),
                file_path,
                doc,
                child,
            ));
        }
        nodes.push(child);
    }
    Ok(nodes)
}

fn parse_placement(
    file_path: &Path,
    doc: &Document<'_>,
    node: Node<'_, '_>,
) -> Result<PlacementRecord, IndexLoadError> {
    let name = record_name(file_path, doc, node, "item")?;
    let mut seen_fields = HashSet::<String>::new();
    let mut scene: Option<String> = None;
    let mut position = Vec3::ZERO;
    let mut size: Option<Vec3> = None;

    for field in node.children().filter(|child| child.is_element()) {
        let field_name = field.tag_name().name().to_string();
        if !seen_fields.insert(field_name.clone()) {
            return Err(error_at_node(
                IndexErrorCode::DuplicateField,
                format!("duplicate field <{field_name}> in <item>"),
                file_path,
                doc,
                field,
            ));
        }

        match field_name.as_str() {
            "sceneName" => scene = Some(required_text(file_path, doc, field, "sceneName")?),
            "x" => position.x = number_field(file_path, doc, field, "x")?,
            "y" => position.y = number_field(file_path, doc, field, "y")?,
            "z" => position.z = number_field(file_path, doc, field, "z")?,
            "w" => size.get_or_insert(Vec3::ZERO).x = number_field(file_path, doc, field, "w")?,
            "h" => size.get_or_insert(Vec3::ZERO).y = number_field(file_path, doc, field, "h")?,
            "d" => size.get_or_insert(Vec3::ZERO).z = number_field(file_path, doc, field, "d")?,
            // Randomizer metadata we do not map.
            "type" | "pool" | "action" | "areaName" | "objectName" | "newShiny" => {}
            _ => {
                return Err(error_at_node(
                    IndexErrorCode::UnknownField,
                    format!("unknown field <{field_name}> in <item>"),
                    file_path,
                    doc,
                    field,
                ))
            }
        }
    }

    let Some(scene) = scene else {
        return Err(error_at_node(
            IndexErrorCode::MissingField,
            "missing required field <sceneName> in <item>".to_string(),
            file_path,
            doc,
            node,
        ));
    };

    Ok(PlacementRecord {
        name,
        scene,
        position,
        size,
    })
}

fn parse_transition(
    file_path: &Path,
    doc: &Document<'_>,
    node: Node<'_, '_>,
) -> Result<TransitionRecord, IndexLoadError> {
    let name = record_name(file_path, doc, node, "transition")?;
    let mut seen_fields = HashSet::<String>::new();
    let mut scene: Option<String> = None;
    let mut door_name: Option<String> = None;
    let mut target: Option<String> = None;

    for field in node.children().filter(|child| child.is_element()) {
        let field_name = field.tag_name().name().to_string();
        if !seen_fields.insert(field_name.clone()) {
            return Err(error_at_node(
                IndexErrorCode::DuplicateField,
                format!("duplicate field <{field_name}> in <transition>"),
                file_path,
                doc,
                field,
            ));
        }

        match field_name.as_str() {
            "sceneName" => scene = Some(required_text(file_path, doc, field, "sceneName")?),
            "doorName" => door_name = Some(required_text(file_path, doc, field, "doorName")?),
            "vanillaTarget" => {
                target = Some(required_text(file_path, doc, field, "vanillaTarget")?)
            }
            "areaName" | "oneWay" => {}
            _ => {
                return Err(error_at_node(
                    IndexErrorCode::UnknownField,
                    format!("unknown field <{field_name}> in <transition>"),
                    file_path,
                    doc,
                    field,
                ))
            }
        }
    }

    let missing = |field: &str| {
        error_at_node(
            IndexErrorCode::MissingField,
            format!("missing required field <{field}> in <transition>"),
            file_path,
            doc,
            node,
        )
    };
    Ok(TransitionRecord {
        name,
        scene: scene.ok_or_else(|| missing("sceneName"))?,
        door_name: door_name.ok_or_else(|| missing("doorName"))?,
        target: target.ok_or_else(|| missing("vanillaTarget"))?,
    })
}

fn record_name(
    file_path: &Path,
    doc: &Document<'_>,
    node: Node<'_, '_>,
    element: &str,
) -> Result<String, IndexLoadError> {
    match node.attribute("name").map(str::trim) {
        Some(name) if !name.is_empty() => Ok(name.to_string()),
        _ => Err(error_at_node(
            IndexErrorCode::MissingField,
            format!("<{element}> requires a non-empty name attribute"),
            file_path,
            doc,
            node,
        )),
    }
}

fn required_text(
    file_path: &Path,
    doc: &Document<'_>,
    node: Node<'_, '_>,
    field_name: &str,
) -> Result<String, IndexLoadError> {
    let value = node.text().map(str::trim).unwrap_or_default().to_string();
    if value.is_empty() {
        return Err(error_at_node(
            IndexErrorCode::MissingField,
            format!("field <{field_name}> must not be empty"),
            file_path,
            doc,
            node,
        ));
    }
    Ok(value)
}

fn number_field(
    file_path: &Path,
    doc: &Document<'_>,
    node: Node<'_, '_>,
    field_name: &str,
) -> Result<f32, IndexLoadError> {
    let value = required_text(file_path, doc, node, field_name)?;
    let parsed = value.parse::<f32>().map_err(|_| {
        error_at_node(
            IndexErrorCode::InvalidValue,
            format!("{field_name} '{value}' is not a valid number"),
            file_path,
            doc,
            node,
        )
    })?;
    if !parsed.is_finite() {
        return Err(error_at_node(
            IndexErrorCode::InvalidValue,
            format!("{field_name} must be finite"),
            file_path,
            doc,
            node,
        ));
    }
    Ok(parsed)
}

fn error_at_node(
    code: IndexErrorCode,
    message: String,
    file_path: &Path,
    doc: &Document<'_>,
    node: Node<'_, '_>,
) -> IndexLoadError {
    let pos = doc.text_pos_at(node.range().start);
    IndexLoadError {
        code,
        message,
        file_path: file_path.to_path_buf(),
        location: Some(SourceLocation {
            line: pos.row as usize,
            column: pos.col as usize,
        }),
    }
}
