/// Maps classifier vocabularies onto canonical food names.
#[derive(Debug, Clone)]
pub struct LabelNormalizer {
    synonyms: Vec<(String, String)>,
}

impl LabelNormalizer {
    /// `synonyms` is ordered; earlier entries win when several match.
    pub fn new(synonyms: Vec<(String, String)>) -> Self {
        let synonyms = synonyms
            .into_iter()
            .map(|(raw, canonical)| (raw.to_lowercase(), canonical))
            .collect();
        Self { synonyms }
    }

    /// Never fails: unknown labels are lower-cased with `_` turned into spaces.
    pub fn normalize(&self, raw_label: &str) -> String {
        let lowered = raw_label.to_lowercase();
        self.synonyms
            .iter()
            .find(|(raw, _)| lowered.contains(raw.as_str()))
            .map(|(_, canonical)| canonical.clone())
            .unwrap_or_else(|| lowered.replace('_', " "))
    }

    pub fn len(&self) -> usize {
        self.synonyms.len()
    }

    pub fn is_empty(&self) -> bool {
        self.synonyms.is_empty()
    }
}
