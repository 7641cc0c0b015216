//! Host participant identity

/// A participant in the host game session
///
/// Only the display name crosses the wire; the id lets the host's
/// predicates tell participants apart.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Participant {
    pub id: u32,
    pub name: String,
}

impl Participant {
    pub fn new(id: u32, name: impl Into<String>) -> Self {
        Self {
            id,
            name: name.into(),
        }
    }
}
