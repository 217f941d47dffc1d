//! Construction options.
//!
//! One engine serves every combination below; the enums are consulted at the
//! few points where the variants actually differ.

/// How compressed labels are used.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash)]
pub enum Variant {
    /// One unit per character up to the point where a key becomes unique,
    /// then a terminal suffix label ("tail") in the arena.
    #[default]
    MpTrie,
    /// Path compression: non-branching chains are stored as internal labels
    /// whose arena entry starts with a relay base.
    Patricia,
}

impl Variant {
    /// Whether a node may carry an internal label with an embedded relay base.
    #[inline]
    pub fn relay_labels(self) -> bool {
        matches!(self, Variant::Patricia)
    }
}

/// How an incoming transition is validated.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash)]
pub enum Addressing {
    /// `check` holds the parent's unit index.
    #[default]
    ParentCheck,
    /// `check` holds the unit's own transition character. Bases are exclusive:
    /// no two nodes may share one.
    LetterCheck,
}

impl Addressing {
    /// Value stored in the `check` field of the child of `parent` on `c`.
    #[inline]
    pub(crate) fn check_value(self, parent: u32, c: u8) -> u32 {
        match self {
            Addressing::ParentCheck => parent,
            Addressing::LetterCheck => c as u32,
        }
    }

    /// Whether the owner of an occupied unit can be read from its `check`.
    #[inline]
    pub(crate) fn owner_known(self) -> bool {
        matches!(self, Addressing::ParentCheck)
    }

    #[inline]
    pub(crate) fn exclusive_bases(self) -> bool {
        matches!(self, Addressing::LetterCheck)
    }
}

/// Order of children in a sibling chain.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash)]
pub enum SiblingOrder {
    /// Ascending by character, so iteration yields keys in byte order.
    #[default]
    Sorted,
    /// Order in which the children were first inserted.
    Insertion,
}

/// Strategy used to test a block for a free alignment.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash)]
pub enum BaseSearch {
    /// XOR-permute the block's empty bitmap by every sibling and AND the results.
    #[default]
    BitParallel,
    /// Walk the block's empty-slot ring and test each candidate alignment.
    EmptyScan,
}

/// Default number of failed multi-character searches before a block is demoted
/// to the personal ring.
pub const DEFAULT_MAX_TRIALS: u16 = 1;

/// Configuration for [`DaTrie`](crate::DaTrie).
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Config {
    pub variant: Variant,
    pub addressing: Addressing,
    pub sibling_order: SiblingOrder,
    pub base_search: BaseSearch,
    /// Failed searches tolerated before a block leaves the general ring.
    pub max_trials: u16,
    /// Compact the array after every erase (parent-check addressing only).
    pub compact_on_erase: bool,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            variant: Variant::default(),
            addressing: Addressing::default(),
            sibling_order: SiblingOrder::default(),
            base_search: BaseSearch::default(),
            max_trials: DEFAULT_MAX_TRIALS,
            compact_on_erase: true,
        }
    }
}

impl Config {
    /// Shorthand for a Patricia trie with otherwise default settings.
    pub fn patricia() -> Self {
        Self::default().with_variant(Variant::Patricia)
    }

    pub fn with_variant(mut self, variant: Variant) -> Self {
        self.variant = variant;
        self
    }

    pub fn with_addressing(mut self, addressing: Addressing) -> Self {
        self.addressing = addressing;
        self
    }

    pub fn with_sibling_order(mut self, order: SiblingOrder) -> Self {
        self.sibling_order = order;
        self
    }

    pub fn with_base_search(mut self, search: BaseSearch) -> Self {
        self.base_search = search;
        self
    }

    /// A threshold of 0 is treated as 1.
    pub fn with_max_trials(mut self, max_trials: u16) -> Self {
        self.max_trials = max_trials.max(1);
        self
    }

    pub fn with_compact_on_erase(mut self, compact: bool) -> Self {
        self.compact_on_erase = compact;
        self
    }

    /// Whether erase is followed by `reduce`.
    #[inline]
    pub(crate) fn compacts(&self) -> bool {
        self.compact_on_erase && self.addressing.owner_known()
    }
}
