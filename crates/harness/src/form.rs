//! Form filling and read-back
//!
//! A [`FieldMap`] names each field by id, `name` attribute or visible label
//! and gives the value to put there. Sub-tables (tags, macros, ...) are
//! driven by [`RowOp`]s that add, update or remove rows by their display
//! order. Filling is idempotent: filling the same map twice leaves the form
//! exactly as one fill does.

use serde::de::{MapAccess, Visitor};
use serde::ser::SerializeMap;
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::collections::{BTreeMap, HashMap};
use std::fmt;
use tracing::debug;

use crate::driver::ElementRef;
use crate::error::{HarnessError, HarnessResult};
use crate::selector::{Locator, Selector};
use crate::session::Session;

const TABLE_ROW: &str = "tr.form_row";
const TABLE_INPUTS: &str = "input, textarea";
const TABLE_ADD: &str = "button.element-table-add";
const TABLE_REMOVE: &str = "button.element-table-remove";

/// How a field is located inside its form.
///
/// Written as `id:...`, `name:...`, or plain label text.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub enum FieldKey {
    Id(String),
    Name(String),
    Label(String),
}

impl From<&str> for FieldKey {
    fn from(s: &str) -> Self {
        if let Some(id) = s.strip_prefix("id:") {
            FieldKey::Id(id.to_string())
        } else if let Some(name) = s.strip_prefix("name:") {
            FieldKey::Name(name.to_string())
        } else {
            FieldKey::Label(s.to_string())
        }
    }
}

impl From<String> for FieldKey {
    fn from(s: String) -> Self {
        FieldKey::from(s.as_str())
    }
}

impl From<FieldKey> for String {
    fn from(key: FieldKey) -> Self {
        key.to_string()
    }
}

impl fmt::Display for FieldKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FieldKey::Id(id) => write!(f, "id:{}", id),
            FieldKey::Name(name) => write!(f, "name:{}", name),
            FieldKey::Label(label) => f.write_str(label),
        }
    }
}

/// Column name to cell value of one sub-table row
pub type RowValues = BTreeMap<String, String>;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RowAction {
    Add,
    Update { index: usize },
    Remove { index: usize },
}

/// One edit of a sub-table
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "RawRowOp", into = "RawRowOp")]
pub struct RowOp {
    pub action: RowAction,
    pub values: RowValues,
}

impl RowOp {
    pub fn add<I, K, V>(values: I) -> Self
    where
        I: IntoIterator<Item = (K, V)>,
        K: Into<String>,
        V: Into<String>,
    {
        Self {
            action: RowAction::Add,
            values: collect_values(values),
        }
    }

    pub fn update<I, K, V>(index: usize, values: I) -> Self
    where
        I: IntoIterator<Item = (K, V)>,
        K: Into<String>,
        V: Into<String>,
    {
        Self {
            action: RowAction::Update { index },
            values: collect_values(values),
        }
    }

    pub fn remove(index: usize) -> Self {
        Self {
            action: RowAction::Remove { index },
            values: RowValues::new(),
        }
    }
}

fn collect_values<I, K, V>(values: I) -> RowValues
where
    I: IntoIterator<Item = (K, V)>,
    K: Into<String>,
    V: Into<String>,
{
    values
        .into_iter()
        .map(|(k, v)| (k.into(), v.into()))
        .collect()
}

#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
enum RawAction {
    #[default]
    Add,
    Update,
    Remove,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
struct RawRowOp {
    #[serde(default)]
    action: RawAction,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    index: Option<usize>,
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    values: RowValues,
}

impl TryFrom<RawRowOp> for RowOp {
    type Error = String;

    fn try_from(raw: RawRowOp) -> Result<Self, Self::Error> {
        let action = match (raw.action, raw.index) {
            (RawAction::Add, None) => RowAction::Add,
            (RawAction::Add, Some(_)) => return Err("add takes no index".to_string()),
            (RawAction::Update, Some(index)) => RowAction::Update { index },
            (RawAction::Remove, Some(index)) => RowAction::Remove { index },
            (_, None) => return Err("update and remove need an index".to_string()),
        };
        Ok(Self {
            action,
            values: raw.values,
        })
    }
}

impl From<RowOp> for RawRowOp {
    fn from(op: RowOp) -> Self {
        let (action, index) = match op.action {
            RowAction::Add => (RawAction::Add, None),
            RowAction::Update { index } => (RawAction::Update, Some(index)),
            RowAction::Remove { index } => (RawAction::Remove, Some(index)),
        };
        Self {
            action,
            index,
            values: op.values,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FieldValue {
    Text(String),
    Checkbox(bool),
    /// Visible text of the option to select
    Select(String),
    /// Visible texts of every option that should end up selected
    MultiSelect(Vec<String>),
    Table(Vec<RowOp>),
}

/// Ordered field-to-value map. Fields are filled in insertion order.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct FieldMap {
    fields: Vec<(FieldKey, FieldValue)>,
}

impl FieldMap {
    pub fn new() -> Self {
        Self::default()
    }

    /// Set a field, replacing an earlier value for the same key in place.
    pub fn insert(&mut self, key: impl Into<FieldKey>, value: FieldValue) {
        let key = key.into();
        match self.fields.iter_mut().find(|(k, _)| *k == key) {
            Some(slot) => slot.1 = value,
            None => self.fields.push((key, value)),
        }
    }

    pub fn with(mut self, key: impl Into<FieldKey>, value: FieldValue) -> Self {
        self.insert(key, value);
        self
    }

    pub fn text(self, key: impl Into<FieldKey>, value: impl Into<String>) -> Self {
        self.with(key, FieldValue::Text(value.into()))
    }

    pub fn checkbox(self, key: impl Into<FieldKey>, checked: bool) -> Self {
        self.with(key, FieldValue::Checkbox(checked))
    }

    pub fn select(self, key: impl Into<FieldKey>, option: impl Into<String>) -> Self {
        self.with(key, FieldValue::Select(option.into()))
    }

    pub fn multi_select<I, S>(self, key: impl Into<FieldKey>, options: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.with(
            key,
            FieldValue::MultiSelect(options.into_iter().map(Into::into).collect()),
        )
    }

    pub fn table(self, key: impl Into<FieldKey>, ops: Vec<RowOp>) -> Self {
        self.with(key, FieldValue::Table(ops))
    }

    pub fn get(&self, key: &FieldKey) -> Option<&FieldValue> {
        self.fields.iter().find(|(k, _)| k == key).map(|(_, v)| v)
    }

    pub fn contains(&self, key: &FieldKey) -> bool {
        self.get(key).is_some()
    }

    /// The text a `Text` field is set to
    pub fn text_value(&self, key: impl Into<FieldKey>) -> Option<&str> {
        match self.get(&key.into()) {
            Some(FieldValue::Text(text)) => Some(text),
            _ => None,
        }
    }

    pub fn iter(&self) -> impl Iterator<Item = (&FieldKey, &FieldValue)> {
        self.fields.iter().map(|(k, v)| (k, v))
    }

    pub fn len(&self) -> usize {
        self.fields.len()
    }

    pub fn is_empty(&self) -> bool {
        self.fields.is_empty()
    }

    /// What a read-back of this map should show: removals dropped and every
    /// remaining row reduced to its values.
    pub fn expected_readback(&self) -> FieldMap {
        let fields = self
            .fields
            .iter()
            .map(|(key, value)| {
                let value = match value {
                    FieldValue::Table(ops) => FieldValue::Table(
                        ops.iter()
                            .filter(|op| !matches!(op.action, RowAction::Remove { .. }))
                            .map(|op| RowOp {
                                action: RowAction::Add,
                                values: op.values.clone(),
                            })
                            .collect(),
                    ),
                    other => other.clone(),
                };
                (key.clone(), value)
            })
            .collect();
        FieldMap { fields }
    }

    /// Human-readable differences between an expected map and a read-back.
    ///
    /// Only fields present in `self` are compared. Table rows ignore their
    /// action, treat a missing column as empty, and skip blank rows.
    pub fn diff(&self, actual: &FieldMap) -> Vec<String> {
        let mut diffs = Vec::new();
        for (key, expected) in &self.fields {
            match actual.get(key) {
                None => diffs.push(format!("{}: not read back", key)),
                Some(found) if !values_match(expected, found) => {
                    diffs.push(format!("{}: expected {:?}, got {:?}", key, expected, found))
                }
                Some(_) => {}
            }
        }
        diffs
    }
}

impl<K: Into<FieldKey>> FromIterator<(K, FieldValue)> for FieldMap {
    fn from_iter<T: IntoIterator<Item = (K, FieldValue)>>(iter: T) -> Self {
        let mut map = FieldMap::new();
        for (key, value) in iter {
            map.insert(key, value);
        }
        map
    }
}

impl Serialize for FieldMap {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let mut map = serializer.serialize_map(Some(self.fields.len()))?;
        for (key, value) in &self.fields {
            map.serialize_entry(&key.to_string(), value)?;
        }
        map.end()
    }
}

impl<'de> Deserialize<'de> for FieldMap {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        struct FieldMapVisitor;

        impl<'de> Visitor<'de> for FieldMapVisitor {
            type Value = FieldMap;

            fn expecting(&self, f: &mut fmt::Formatter) -> fmt::Result {
                f.write_str("a map of field keys to field values")
            }

            fn visit_map<A: MapAccess<'de>>(self, mut access: A) -> Result<FieldMap, A::Error> {
                let mut map = FieldMap::new();
                while let Some((key, value)) = access.next_entry::<String, FieldValue>()? {
                    map.insert(key, value);
                }
                Ok(map)
            }
        }

        deserializer.deserialize_map(FieldMapVisitor)
    }
}

fn values_match(expected: &FieldValue, actual: &FieldValue) -> bool {
    match (expected, actual) {
        (FieldValue::MultiSelect(a), FieldValue::MultiSelect(b)) => {
            let mut a = a.clone();
            let mut b = b.clone();
            a.sort();
            b.sort();
            a == b
        }
        (FieldValue::Table(a), FieldValue::Table(b)) => {
            let a: Vec<&RowValues> = a
                .iter()
                .filter(|op| !matches!(op.action, RowAction::Remove { .. }))
                .map(|op| &op.values)
                .filter(|v| !is_blank_row(v))
                .collect();
            let b: Vec<&RowValues> = b
                .iter()
                .map(|op| &op.values)
                .filter(|v| !is_blank_row(v))
                .collect();
            a.len() == b.len() && a.iter().zip(&b).all(|(x, y)| rows_match(x, y))
        }
        _ => expected == actual,
    }
}

fn rows_match(a: &RowValues, b: &RowValues) -> bool {
    a.keys().chain(b.keys()).all(|column| {
        a.get(column).map(String::as_str).unwrap_or("") == b.get(column).map(String::as_str).unwrap_or("")
    })
}

fn is_blank_row(values: &RowValues) -> bool {
    values.values().all(|v| v.is_empty())
}

/// Rows a set of ops produces from a baseline, and which baseline rows
/// (by display index) have to be removed to get there.
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) struct RowPlan {
    pub removed: Vec<usize>,
    pub target: Vec<RowValues>,
}

pub(crate) fn plan_rows(baseline: &[RowValues], ops: &[RowOp]) -> Result<RowPlan, String> {
    struct Slot {
        origin: Option<usize>,
        values: RowValues,
    }

    let mut slots: Vec<Slot> = baseline
        .iter()
        .enumerate()
        .map(|(i, values)| Slot {
            origin: Some(i),
            values: values.clone(),
        })
        .collect();
    let mut removed = Vec::new();

    for op in ops {
        match op.action {
            RowAction::Add => match slots.iter_mut().find(|s| is_blank_row(&s.values)) {
                Some(slot) => slot.values = op.values.clone(),
                None => slots.push(Slot {
                    origin: None,
                    values: op.values.clone(),
                }),
            },
            RowAction::Update { index } => {
                let slot = slots
                    .get_mut(index)
                    .ok_or_else(|| format!("no row {} to update ({} rows)", index, baseline.len()))?;
                slot.values
                    .extend(op.values.iter().map(|(k, v)| (k.clone(), v.clone())));
            }
            RowAction::Remove { index } => {
                if index >= slots.len() {
                    return Err(format!("no row {} to remove ({} rows)", index, slots.len()));
                }
                if let Some(origin) = slots.remove(index).origin {
                    removed.push(origin);
                }
            }
        }
    }

    removed.sort_unstable();
    Ok(RowPlan {
        removed,
        target: slots.into_iter().map(|s| s.values).collect(),
    })
}

/// Column name of a sub-table input, from names like `tags[0][tag]`.
pub(crate) fn column_name(input_name: &str) -> &str {
    input_name
        .strip_suffix(']')
        .and_then(|s| s.rfind('[').map(|i| &s[i + 1..]))
        .unwrap_or(input_name)
}

/// A form on the current page.
///
/// Keeps the first-seen rows of every sub-table it fills, so a repeated
/// fill replays the same edits against the same starting point.
pub struct Form {
    locator: Locator,
    required: Vec<FieldKey>,
    baselines: HashMap<FieldKey, Vec<RowValues>>,
}

impl Form {
    pub fn new(locator: impl Into<Locator>) -> Self {
        Self {
            locator: locator.into(),
            required: Vec::new(),
            baselines: HashMap::new(),
        }
    }

    /// Fields every fill must supply.
    pub fn require<I, K>(mut self, keys: I) -> Self
    where
        I: IntoIterator<Item = K>,
        K: Into<FieldKey>,
    {
        self.required.extend(keys.into_iter().map(Into::into));
        self
    }

    pub fn locator(&self) -> &Locator {
        &self.locator
    }

    /// Fill every field of the map in order.
    ///
    /// Fails before touching the page when a required field is missing.
    pub async fn fill(&mut self, session: &mut Session, fields: &FieldMap) -> HarnessResult<()> {
        if let Some(missing) = self.required.iter().find(|k| !fields.contains(k)) {
            return Err(HarnessError::MissingField(missing.to_string()));
        }

        for (key, value) in fields.iter() {
            debug!("Filling {} with {:?}", key, value);
            let element = self.field(session, key).await?;
            match value {
                FieldValue::Text(text) => set_text(session, &element, text).await?,
                FieldValue::Checkbox(checked) => {
                    if session.browser().is_selected(&element).await? != *checked {
                        session.browser().click(&element).await?;
                    }
                }
                FieldValue::Select(option) => {
                    select_options(session, key, &element, std::slice::from_ref(option), true).await?
                }
                FieldValue::MultiSelect(options) => {
                    select_options(session, key, &element, options, false).await?
                }
                FieldValue::Table(ops) => self.fill_table(session, key, &element, ops).await?,
            }
        }
        Ok(())
    }

    /// Click a submit button of this form by its text. Does not verify the
    /// outcome.
    ///
    /// Row buttons of sub-tables (`type="button"`) may carry the same text
    /// and are never picked.
    pub async fn submit(&self, session: &mut Session, button: &str) -> HarnessResult<()> {
        let locator = self.locator.clone().within(Selector::button(button));
        session.find(&locator).await?;
        for (index, candidate) in session.find_all(&locator).await?.iter().enumerate() {
            let kind = session.browser().attribute(candidate, "type").await?;
            if kind.as_deref() != Some("button") {
                return session.click(&locator.clone().nth(index)).await;
            }
        }
        Err(HarnessError::ElementNotFound(format!("submit button {}", locator)))
    }

    /// Read back the fields named in `shape`, each as the same kind of value.
    pub async fn read(&self, session: &mut Session, shape: &FieldMap) -> HarnessResult<FieldMap> {
        let mut out = FieldMap::new();
        for (key, kind) in shape.iter() {
            let element = self.field(session, key).await?;
            let value = match kind {
                FieldValue::Text(_) => FieldValue::Text(session.browser().value(&element).await?),
                FieldValue::Checkbox(_) => {
                    FieldValue::Checkbox(session.browser().is_selected(&element).await?)
                }
                FieldValue::Select(_) => FieldValue::Select(
                    selected_options(session, &element)
                        .await?
                        .into_iter()
                        .next()
                        .unwrap_or_default(),
                ),
                FieldValue::MultiSelect(_) => {
                    FieldValue::MultiSelect(selected_options(session, &element).await?)
                }
                FieldValue::Table(_) => FieldValue::Table(
                    read_rows(session, &element)
                        .await?
                        .into_iter()
                        .filter(|row| !is_blank_row(row))
                        .map(|values| RowOp {
                            action: RowAction::Add,
                            values,
                        })
                        .collect(),
                ),
            };
            out.insert(key.clone(), value);
        }
        Ok(out)
    }

    async fn field(&self, session: &mut Session, key: &FieldKey) -> HarnessResult<ElementRef> {
        let selector = match key {
            FieldKey::Id(id) => Selector::id(id.clone()),
            FieldKey::Name(name) => Selector::name(name.clone()),
            FieldKey::Label(text) => {
                let labels = session
                    .find_all(&self.locator.clone().within(Selector::css("label")))
                    .await?;
                let mut target = None;
                for label in &labels {
                    if session.browser().text(label).await?.trim() == text.as_str() {
                        target = session.browser().attribute(label, "for").await?;
                        break;
                    }
                }
                match target {
                    Some(id) => Selector::id(id),
                    None => {
                        return Err(HarnessError::ElementNotFound(format!(
                            "label {:?} in {}",
                            text, self.locator
                        )))
                    }
                }
            }
        };
        session.find(&self.locator.clone().within(selector)).await
    }

    async fn fill_table(
        &mut self,
        session: &mut Session,
        key: &FieldKey,
        table: &ElementRef,
        ops: &[RowOp],
    ) -> HarnessResult<()> {
        let current = read_rows(session, table).await?;
        let baseline = self
            .baselines
            .entry(key.clone())
            .or_insert_with(|| current.clone())
            .clone();
        let plan = plan_rows(&baseline, ops).map_err(|reason| HarnessError::InvalidField {
            field: key.to_string(),
            reason,
        })?;

        // Removals address baseline rows, so they only apply while the
        // table still shows the baseline.
        if current == baseline {
            let rows = row_elements(session, table).await?;
            for index in plan.removed.iter().rev() {
                if let Some(row) = rows.get(*index) {
                    click_within(session, row, TABLE_REMOVE).await?;
                }
            }
        }

        let mut rows = row_elements(session, table).await?;
        while rows.len() < plan.target.len() {
            click_within(session, table, TABLE_ADD).await?;
            let grown = row_elements(session, table).await?;
            if grown.len() <= rows.len() {
                return Err(HarnessError::InvalidField {
                    field: key.to_string(),
                    reason: "adding a row did not grow the table".to_string(),
                });
            }
            rows = grown;
        }
        while rows.len() > plan.target.len() {
            if let Some(last) = rows.last() {
                click_within(session, last, TABLE_REMOVE).await?;
            }
            rows = row_elements(session, table).await?;
        }

        for (row, values) in rows.iter().zip(&plan.target) {
            write_row(session, row, values).await?;
        }
        Ok(())
    }
}

async fn set_text(session: &mut Session, element: &ElementRef, text: &str) -> HarnessResult<()> {
    let browser = session.browser();
    if browser.value(element).await? == text {
        return Ok(());
    }
    browser.clear(element).await?;
    if !text.is_empty() {
        browser.send_keys(element, text).await?;
    }
    Ok(())
}

async fn select_options(
    session: &mut Session,
    key: &FieldKey,
    select: &ElementRef,
    wanted: &[String],
    single: bool,
) -> HarnessResult<()> {
    let browser = session.browser();
    let options = browser.find_within(select, &Selector::css("option")).await?;
    let mut labels = Vec::with_capacity(options.len());
    for option in &options {
        labels.push(browser.text(option).await?.trim().to_string());
    }
    if let Some(unknown) = wanted.iter().find(|w| !labels.contains(w)) {
        return Err(HarnessError::InvalidField {
            field: key.to_string(),
            reason: format!("no option {:?}", unknown),
        });
    }
    for (option, label) in options.iter().zip(&labels) {
        let want = wanted.contains(label);
        let selected = browser.is_selected(option).await?;
        if (single && want && !selected) || (!single && want != selected) {
            browser.click(option).await?;
        }
    }
    Ok(())
}

async fn selected_options(session: &mut Session, select: &ElementRef) -> HarnessResult<Vec<String>> {
    let browser = session.browser();
    let mut selected = Vec::new();
    for option in browser.find_within(select, &Selector::css("option")).await? {
        if browser.is_selected(&option).await? {
            selected.push(browser.text(&option).await?.trim().to_string());
        }
    }
    Ok(selected)
}

async fn row_elements(session: &mut Session, table: &ElementRef) -> HarnessResult<Vec<ElementRef>> {
    session
        .browser()
        .find_within(table, &Selector::css(TABLE_ROW))
        .await
}

async fn row_inputs(
    session: &mut Session,
    row: &ElementRef,
) -> HarnessResult<Vec<(String, ElementRef)>> {
    let browser = session.browser();
    let mut inputs = Vec::new();
    for input in browser.find_within(row, &Selector::css(TABLE_INPUTS)).await? {
        if browser.attribute(&input, "type").await?.as_deref() == Some("hidden") {
            continue;
        }
        if let Some(name) = browser.attribute(&input, "name").await? {
            inputs.push((column_name(&name).to_string(), input));
        }
    }
    Ok(inputs)
}

async fn read_rows(session: &mut Session, table: &ElementRef) -> HarnessResult<Vec<RowValues>> {
    let mut rows = Vec::new();
    for row in row_elements(session, table).await? {
        let mut values = RowValues::new();
        for (column, input) in row_inputs(session, &row).await? {
            let value = session.browser().value(&input).await?;
            values.insert(column, value);
        }
        rows.push(values);
    }
    Ok(rows)
}

async fn write_row(session: &mut Session, row: &ElementRef, values: &RowValues) -> HarnessResult<()> {
    for (column, input) in row_inputs(session, row).await? {
        let wanted = values.get(&column).map(String::as_str).unwrap_or("");
        set_text(session, &input, wanted).await?;
    }
    Ok(())
}

async fn click_within(session: &mut Session, parent: &ElementRef, css: &str) -> HarnessResult<()> {
    let browser = session.browser();
    let button = browser
        .find_within(parent, &Selector::css(css))
        .await?
        .into_iter()
        .next()
        .ok_or_else(|| HarnessError::ElementNotFound(format!("{} in {}", css, parent)))?;
    browser.click(&button).await
}

#[cfg(test)]
mod tests {
    use super::*;

    fn row(pairs: &[(&str, &str)]) -> RowValues {
        pairs.iter().map(|(k, v)| (k.to_string(), v.to_string())).collect()
    }

    #[test]
    fn test_field_key_parse() {
        assert_eq!(FieldKey::from("id:hk_audit"), FieldKey::Id("hk_audit".into()));
        assert_eq!(FieldKey::from("name:groups[]"), FieldKey::Name("groups[]".into()));
        assert_eq!(FieldKey::from("Group name"), FieldKey::Label("Group name".into()));
        assert_eq!(FieldKey::from("id:x").to_string(), "id:x");
    }

    #[test]
    fn test_column_name() {
        assert_eq!(column_name("tags[0][tag]"), "tag");
        assert_eq!(column_name("macros[12][description]"), "description");
        assert_eq!(column_name("plain"), "plain");
    }

    #[test]
    fn test_plan_update_and_add() {
        let baseline = vec![row(&[("tag", "a"), ("value", "1")]), row(&[("tag", "b"), ("value", "2")])];
        let plan = plan_rows(
            &baseline,
            &[
                RowOp::update(1, [("value", "20")]),
                RowOp::add([("tag", "c"), ("value", "3")]),
            ],
        )
        .unwrap();
        assert!(plan.removed.is_empty());
        assert_eq!(
            plan.target,
            vec![
                row(&[("tag", "a"), ("value", "1")]),
                row(&[("tag", "b"), ("value", "20")]),
                row(&[("tag", "c"), ("value", "3")]),
            ]
        );
    }

    #[test]
    fn test_plan_remove_shifts_indexes() {
        let baseline = vec![row(&[("tag", "a")]), row(&[("tag", "b")]), row(&[("tag", "c")])];
        // After removing row 0, "c" is displayed at index 1.
        let plan = plan_rows(&baseline, &[RowOp::remove(0), RowOp::update(1, [("tag", "C")])]).unwrap();
        assert_eq!(plan.removed, vec![0]);
        assert_eq!(plan.target, vec![row(&[("tag", "b")]), row(&[("tag", "C")])]);
    }

    #[test]
    fn test_plan_add_fills_blank_row() {
        let baseline = vec![row(&[("tag", ""), ("value", "")])];
        let plan = plan_rows(&baseline, &[RowOp::add([("tag", "x")])]).unwrap();
        assert_eq!(plan.target, vec![row(&[("tag", "x")])]);
        assert!(plan.removed.is_empty());
    }

    #[test]
    fn test_plan_out_of_range() {
        let baseline = vec![row(&[("tag", "a")])];
        assert!(plan_rows(&baseline, &[RowOp::update(3, [("tag", "x")])]).is_err());
        assert!(plan_rows(&baseline, &[RowOp::remove(1)]).is_err());
    }

    #[test]
    fn test_expected_readback_strips_actions() {
        let input = FieldMap::new()
            .text("Host name", "web-01")
            .table(
                "id:tags-table",
                vec![
                    RowOp::update(0, [("tag", "env"), ("value", "prod")]),
                    RowOp::remove(1),
                    RowOp::add([("tag", "team"), ("value", "ops")]),
                ],
            );
        let expected = input.expected_readback();
        match expected.get(&FieldKey::from("id:tags-table")) {
            Some(FieldValue::Table(rows)) => {
                assert_eq!(rows.len(), 2);
                assert!(rows.iter().all(|r| r.action == RowAction::Add));
            }
            other => panic!("unexpected {other:?}"),
        }
        assert_eq!(expected.get(&FieldKey::from("Host name")), input.get(&FieldKey::from("Host name")));
    }

    #[test]
    fn test_diff_ignores_missing_columns_and_blank_rows() {
        let expected = FieldMap::new().table(
            "id:macros-table",
            vec![RowOp::update(0, [("macro", "{$A}"), ("value", "1")])],
        );
        let actual = FieldMap::new().table(
            "id:macros-table",
            vec![
                RowOp::add([("macro", "{$A}"), ("value", "1"), ("description", "")]),
                RowOp::add([("macro", ""), ("value", ""), ("description", "")]),
            ],
        );
        assert!(expected.diff(&actual).is_empty());

        let changed = FieldMap::new().table(
            "id:macros-table",
            vec![RowOp::add([("macro", "{$A}"), ("value", "2")])],
        );
        assert_eq!(expected.diff(&changed).len(), 1);
    }

    #[test]
    fn test_diff_multiselect_order() {
        let expected = FieldMap::new().multi_select("Host groups", ["Linux servers", "Zabbix servers"]);
        let actual = FieldMap::new().multi_select("Host groups", ["Zabbix servers", "Linux servers"]);
        assert!(expected.diff(&actual).is_empty());
        assert_eq!(expected.diff(&FieldMap::new()), vec!["Host groups: not read back".to_string()]);
    }

    #[test]
    fn test_yaml_field_map_keeps_order() {
        let yaml = r#"
id:hk_audit_mode:
  checkbox: true
Data storage period:
  text: 400d
id:tags-table:
  table:
    - action: update
      index: 0
      values: { tag: env }
    - values: { tag: new, value: x }
    - action: remove
      index: 2
"#;
        let map: FieldMap = serde_yaml::from_str(yaml).unwrap();
        let keys: Vec<String> = map.iter().map(|(k, _)| k.to_string()).collect();
        assert_eq!(keys, vec!["id:hk_audit_mode", "Data storage period", "id:tags-table"]);
        match map.get(&FieldKey::from("id:tags-table")) {
            Some(FieldValue::Table(ops)) => {
                assert_eq!(ops[0].action, RowAction::Update { index: 0 });
                assert_eq!(ops[1].action, RowAction::Add);
                assert_eq!(ops[2], RowOp::remove(2));
            }
            other => panic!("unexpected {other:?}"),
        }
    }

    #[test]
    fn test_yaml_rejects_update_without_index() {
        let yaml = "id:tags-table:\n  table:\n    - action: update\n      values: { tag: x }\n";
        assert!(serde_yaml::from_str::<FieldMap>(yaml).is_err());
    }
}
