//! Predicate vocabulary: the registry of typed relation symbols.
//!
//! Every structure in an analysis run shares one vocabulary. Predicates are
//! created during model construction, immutable afterwards, and addressed by
//! [`PredicateId`] handles into their owning [`Vocabulary`]. There is no
//! unregister: the registry lives for the analysis run and is dropped with
//! it. Each run owns its instance, so tests are isolated by construction.
//!
//! # Predicate properties
//!
//! | property | arity | meaning |
//! |---|---|---|
//! | `abstraction` | 0, 1 | participates in blur (summarization) |
//! | `unique` | 1 | satisfied by at most one element per structure |
//! | `function` | 2 | at most one right element per left element |
//! | `invfunction` | 2 | at most one left element per right element |
//! | `acyclic` | 2 | the paths it defines form no cycles |
//! | `reflexive` | 2 | every element carries a self-loop |
//!
//! Requesting a property on an incompatible arity is a construction error.

use rustc_hash::FxHashMap;
use serde::{Deserialize, Serialize};

use crate::error::{Result, ShapeError};

/// Handle of a predicate within its owning [`Vocabulary`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct PredicateId(pub u32);

/// Declarative description of a predicate, consumed by
/// [`Vocabulary::create_predicate`].
///
/// ```
/// use shapeflow::vocab::PredicateSpec;
///
/// let head = PredicateSpec::unary("head").unique();
/// let next = PredicateSpec::binary("next").function().acyclic();
/// ```
#[derive(Debug, Clone)]
pub struct PredicateSpec {
    name: String,
    arity: usize,
    abstraction: bool,
    unique: bool,
    function: bool,
    invfunction: bool,
    acyclic: bool,
    reflexive: bool,
}

impl PredicateSpec {
    /// A predicate of the given arity; abstraction defaults to on for
    /// arities 0 and 1.
    #[must_use]
    pub fn new(name: impl Into<String>, arity: usize) -> Self {
        Self {
            name: name.into(),
            arity,
            abstraction: arity <= 1,
            unique: false,
            function: false,
            invfunction: false,
            acyclic: false,
            reflexive: false,
        }
    }

    /// A nullary predicate.
    #[must_use]
    pub fn nullary(name: impl Into<String>) -> Self {
        Self::new(name, 0)
    }

    /// A unary predicate.
    #[must_use]
    pub fn unary(name: impl Into<String>) -> Self {
        Self::new(name, 1)
    }

    /// A binary predicate.
    #[must_use]
    pub fn binary(name: impl Into<String>) -> Self {
        Self::new(name, 2)
    }

    /// Set whether the predicate participates in blur.
    #[must_use]
    pub fn abstraction(mut self, abstraction: bool) -> Self {
        self.abstraction = abstraction;
        self
    }

    /// Mark the predicate as satisfied by at most one element (unary only).
    #[must_use]
    pub fn unique(mut self) -> Self {
        self.unique = true;
        self
    }

    /// Mark the predicate as a function (binary only).
    #[must_use]
    pub fn function(mut self) -> Self {
        self.function = true;
        self
    }

    /// Mark the predicate as an inverse function (binary only).
    #[must_use]
    pub fn invfunction(mut self) -> Self {
        self.invfunction = true;
        self
    }

    /// Mark the predicate's paths as acyclic (binary only).
    #[must_use]
    pub fn acyclic(mut self) -> Self {
        self.acyclic = true;
        self
    }

    /// Require a self-loop on every element (binary only).
    #[must_use]
    pub fn reflexive(mut self) -> Self {
        self.reflexive = true;
        self
    }
}

/// A relation symbol of the analysis. Identity is the name; all attributes
/// are fixed at creation.
#[derive(Debug, Clone)]
pub struct Predicate {
    name: String,
    arity: usize,
    abstraction: bool,
    unique: bool,
    function: bool,
    invfunction: bool,
    acyclic: bool,
    reflexive: bool,
}

impl Predicate {
    /// The predicate's name.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// The predicate's arity (0, 1 or 2).
    pub fn arity(&self) -> usize {
        self.arity
    }

    /// Does the predicate participate in blur?
    pub fn abstraction(&self) -> bool {
        self.abstraction
    }

    /// For unary: can it be true for at most one element?
    pub fn unique(&self) -> bool {
        self.unique
    }

    /// For binary: at most one right element per left element?
    pub fn function(&self) -> bool {
        self.function
    }

    /// For binary: at most one left element per right element?
    pub fn invfunction(&self) -> bool {
        self.invfunction
    }

    /// For binary: are the paths it defines acyclic?
    pub fn acyclic(&self) -> bool {
        self.acyclic
    }

    /// For binary: does every element carry a self-loop?
    pub fn reflexive(&self) -> bool {
        self.reflexive
    }
}

impl std::fmt::Display for Predicate {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.name)
    }
}

/// The registry of predicates shared by all structures of an analysis run.
///
/// Arity index sets are kept in creation order, which is deterministic and
/// relied upon by the signature strategy (signatures append values in a
/// fixed predicate order).
#[derive(Debug, Default)]
pub struct Vocabulary {
    predicates: Vec<Predicate>,
    by_name: FxHashMap<String, PredicateId>,
    nullary: Vec<PredicateId>,
    unary: Vec<PredicateId>,
    binary: Vec<PredicateId>,
    unique: Vec<PredicateId>,
    locations: FxHashMap<String, PredicateId>,
}

impl Vocabulary {
    /// An empty vocabulary.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a new predicate.
    ///
    /// # Errors
    ///
    /// Fails if the name is already registered with *any* signature
    /// (including an identical one), if the arity is above 2, or if a
    /// property is requested on an incompatible arity.
    pub fn create_predicate(&mut self, spec: PredicateSpec) -> Result<PredicateId> {
        if self.by_name.contains_key(&spec.name) {
            return Err(ShapeError::DuplicatePredicate(spec.name));
        }
        if spec.arity > 2 {
            return Err(ShapeError::UnsupportedArity {
                name: spec.name,
                arity: spec.arity,
            });
        }
        if spec.unique && spec.arity != 1 {
            return Err(ShapeError::UniqueRequiresUnary {
                name: spec.name,
                arity: spec.arity,
            });
        }
        if spec.abstraction && spec.arity > 1 {
            return Err(ShapeError::AbstractionArity {
                name: spec.name,
                arity: spec.arity,
            });
        }
        let binary_flags = [
            ("function", spec.function),
            ("invfunction", spec.invfunction),
            ("acyclic", spec.acyclic),
            ("reflexive", spec.reflexive),
        ];
        if let Some(&(flag, _)) = binary_flags.iter().find(|&&(_, set)| set && spec.arity != 2) {
            return Err(ShapeError::BinaryFlagArity {
                name: spec.name,
                arity: spec.arity,
                flag,
            });
        }

        let id = PredicateId(self.predicates.len() as u32);
        match spec.arity {
            0 => self.nullary.push(id),
            1 => {
                self.unary.push(id);
                if spec.unique {
                    self.unique.push(id);
                }
            }
            _ => self.binary.push(id),
        }
        self.by_name.insert(spec.name.clone(), id);
        self.predicates.push(Predicate {
            name: spec.name,
            arity: spec.arity,
            abstraction: spec.abstraction,
            unique: spec.unique,
            function: spec.function,
            invfunction: spec.invfunction,
            acyclic: spec.acyclic,
            reflexive: spec.reflexive,
        });
        Ok(id)
    }

    /// Register the location predicate `at[label]` for a program-point
    /// label: unary, non-abstraction, looked up later with
    /// [`Vocabulary::find_location_predicate`].
    pub fn create_location_predicate(&mut self, label: &str) -> Result<PredicateId> {
        let id = self.create_predicate(
            PredicateSpec::unary(format!("at[{label}]")).abstraction(false),
        )?;
        self.locations.insert(label.to_string(), id);
        Ok(id)
    }

    /// The predicate behind a handle.
    ///
    /// # Panics
    ///
    /// Panics on a handle from a different vocabulary (engine bug).
    #[must_use]
    pub fn get(&self, id: PredicateId) -> &Predicate {
        &self.predicates[id.0 as usize]
    }

    /// Look a predicate up by name.
    #[must_use]
    pub fn by_name(&self, name: &str) -> Option<PredicateId> {
        self.by_name.get(name).copied()
    }

    /// Look up the location predicate registered for a program-point label.
    #[must_use]
    pub fn find_location_predicate(&self, label: &str) -> Option<PredicateId> {
        self.locations.get(label).copied()
    }

    /// Number of registered predicates.
    #[must_use]
    pub fn len(&self) -> usize {
        self.predicates.len()
    }

    /// Is the vocabulary empty?
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.predicates.is_empty()
    }

    /// Nullary predicates in creation order.
    pub fn nullary(&self) -> &[PredicateId] {
        &self.nullary
    }

    /// Unary predicates in creation order.
    pub fn unary(&self) -> &[PredicateId] {
        &self.unary
    }

    /// Binary predicates in creation order.
    pub fn binary(&self) -> &[PredicateId] {
        &self.binary
    }

    /// Unique unary predicates in creation order.
    pub fn unique(&self) -> &[PredicateId] {
        &self.unique
    }
}

// =============================================================================
// Tests
// =============================================================================
