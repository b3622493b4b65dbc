//! Extra named form inputs the host wants collected alongside the WiFi
//! credentials, and the insertion-ordered registry that owns them.

use tracing::{debug, warn};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum LabelPlacement {
    #[default]
    Before,
    After,
    None,
}

/// One portal form field. The value is capped at `max_length` characters;
/// submissions beyond that are truncated silently.
#[derive(Debug, Clone)]
pub struct DataField {
    id: String,
    placeholder: String,
    value: String,
    max_length: usize,
    custom_html: Option<String>,
    label_placement: LabelPlacement,
}

impl DataField {
    pub fn new(
        id: impl Into<String>,
        placeholder: impl Into<String>,
        default_value: &str,
        max_length: usize,
    ) -> Self {
        Self {
            id: id.into(),
            placeholder: placeholder.into(),
            value: truncate_chars(default_value, max_length),
            max_length,
            custom_html: None,
            label_placement: LabelPlacement::Before,
        }
    }

    /// A free-form HTML block with no backing input.
    pub fn custom(html: impl Into<String>) -> Self {
        Self {
            id: String::new(),
            placeholder: String::new(),
            value: String::new(),
            max_length: 0,
            custom_html: Some(html.into()),
            label_placement: LabelPlacement::None,
        }
    }

    pub fn with_custom_html(mut self, html: impl Into<String>) -> Self {
        self.custom_html = Some(html.into());
        self
    }

    pub fn with_label_placement(mut self, placement: LabelPlacement) -> Self {
        self.label_placement = placement;
        self
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn placeholder(&self) -> &str {
        &self.placeholder
    }

    pub fn value(&self) -> &str {
        &self.value
    }

    pub fn max_length(&self) -> usize {
        self.max_length
    }

    pub fn custom_html(&self) -> Option<&str> {
        self.custom_html.as_deref()
    }

    pub fn label_placement(&self) -> LabelPlacement {
        self.label_placement
    }

    /// Store a submitted value, truncating strictly at `max_length`
    /// characters. Overlong input is never an error.
    pub fn set_value(&mut self, raw: &str) {
        self.value = truncate_chars(raw, self.max_length);
    }

    /// Whether this field renders as an input (as opposed to a pure custom
    /// HTML block).
    pub fn is_input(&self) -> bool {
        !self.id.is_empty()
    }
}

fn truncate_chars(raw: &str, max: usize) -> String {
    raw.chars().take(max).collect()
}

/// Insertion-ordered collection of [`DataField`]s, owned by the controller.
#[derive(Debug, Default)]
pub struct DataFieldRegistry {
    fields: Vec<DataField>,
}

impl DataFieldRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a field. A second input field with an id already in use is
    /// rejected and the registry is left unchanged; the caller should treat
    /// this as non-fatal and skip the add.
    pub fn add(&mut self, field: DataField) -> bool {
        if field.is_input() && self.fields.iter().any(|f| f.id() == field.id()) {
            warn!(id = field.id(), "data field id already registered, add skipped");
            return false;
        }
        debug!(id = field.id(), "adding data field");
        self.fields.push(field);
        true
    }

    pub fn len(&self) -> usize {
        self.fields.len()
    }

    pub fn is_empty(&self) -> bool {
        self.fields.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &DataField> {
        self.fields.iter()
    }

    pub fn iter_mut(&mut self) -> impl Iterator<Item = &mut DataField> {
        self.fields.iter_mut()
    }

    pub fn get(&self, id: &str) -> Option<&DataField> {
        self.fields.iter().find(|f| f.id() == id)
    }
}
