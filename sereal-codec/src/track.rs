//! Encoder-side offset trackers for back-reference emission
//!
//! All stored offsets are already normalized by `header_offset`, so they
//! can be written to the wire as-is. The alias maps exist only when alias
//! emission is enabled.

use rustc_hash::FxHashMap;

/// Speculative and confirmed alias offsets.
///
/// Every aliasable value's first appearance lands in `speculative`; an
/// entry is promoted to `confirmed` by the first alias that demands it, so
/// no alias infrastructure is paid for when nothing aliases.
#[derive(Debug, Default)]
pub(crate) struct AliasMaps {
    pub confirmed: FxHashMap<usize, u64>,
    pub speculative: FxHashMap<usize, u64>,
}

#[derive(Debug, Default)]
pub(crate) struct Trackers {
    /// reference identity -> offset of the origin tag
    pub tracked: FxHashMap<usize, u64>,
    /// byte-sequence equality -> offset of a SHORT_BINARY/BINARY tag
    pub byte_copy: FxHashMap<Vec<u8>, u64>,
    /// string equality -> offset of a STR_UTF8 tag
    pub string_copy: FxHashMap<String, u64>,
    /// class-name equality -> offset of the class-name payload
    pub classnames: FxHashMap<String, u64>,
    /// alias maps, allocated only when alias emission is on
    pub alias: Option<AliasMaps>,
}

impl Trackers {
    pub fn new(emit_aliases: bool) -> Self {
        Self {
            alias: emit_aliases.then(AliasMaps::default),
            ..Self::default()
        }
    }

    /// Discard everything; the trackers are scoped to one body emission
    pub fn clear(&mut self) {
        self.tracked.clear();
        self.byte_copy.clear();
        self.string_copy.clear();
        self.classnames.clear();
        if let Some(alias) = self.alias.as_mut() {
            alias.confirmed.clear();
            alias.speculative.clear();
        }
    }
}
