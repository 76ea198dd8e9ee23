//! Mapping directives: a discriminated union over the dataflow DSL's
//! directive kinds, dispatched by pattern match rather than virtual call.
use std::fmt;

/// One directive in a dataflow description, in the order it appeared.
///
/// Sizes and offsets default to 1 where the kind doesn't carry one
/// (`Tile`/`Unroll`/`Merge`).
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Directive {
    TemporalMap {
        var: String,
        size: i64,
        offset: i64,
    },
    SpatialMap {
        var: String,
        size: i64,
        offset: i64,
        num_components: i64,
    },
    Tile {
        var: String,
        tile_size: i64,
    },
    Unroll {
        var: String,
    },
    Merge {
        var: String,
    },
}

impl Directive {
    pub fn var(&self) -> &str {
        match self {
            Directive::TemporalMap { var, .. }
            | Directive::SpatialMap { var, .. }
            | Directive::Tile { var, .. }
            | Directive::Unroll { var }
            | Directive::Merge { var } => var,
        }
    }

    /// The mapped/tile size, or 1 for kinds that don't carry one.
    pub fn size(&self) -> i64 {
        match self {
            Directive::TemporalMap { size, .. } | Directive::SpatialMap { size, .. } => *size,
            Directive::Tile { tile_size, .. } => *tile_size,
            Directive::Unroll { .. } | Directive::Merge { .. } => 1,
        }
    }

    /// The mapping offset, or 1 for kinds that don't carry one.
    pub fn offset(&self) -> i64 {
        match self {
            Directive::TemporalMap { offset, .. } | Directive::SpatialMap { offset, .. } => {
                *offset
            }
            Directive::Tile { .. } | Directive::Unroll { .. } | Directive::Merge { .. } => 1,
        }
    }

    pub fn is_temporal_map(&self) -> bool {
        matches!(self, Directive::TemporalMap { .. })
    }

    pub fn is_spatial_map(&self) -> bool {
        matches!(self, Directive::SpatialMap { .. })
    }

    pub fn is_tile(&self) -> bool {
        matches!(self, Directive::Tile { .. })
    }

    pub fn is_unroll(&self) -> bool {
        matches!(self, Directive::Unroll { .. })
    }

    pub fn is_merge(&self) -> bool {
        matches!(self, Directive::Merge { .. })
    }
}

impl fmt::Display for Directive {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            Directive::TemporalMap { var, size, offset } => {
                write!(f, "Temporal_Map({}, {}) {}", size, offset, var)
            }
            Directive::SpatialMap {
                var,
                size,
                offset,
                num_components,
            } => write!(
                f,
                "Spatial_Map({}, {}) {} [components: {}]",
                size, offset, var, num_components
            ),
            Directive::Tile { var, tile_size } => write!(f, "Cluster({}) {}", tile_size, var),
            Directive::Unroll { var } => write!(f, "unroll {}", var),
            Directive::Merge { var } => write!(f, "merge {}", var),
        }
    }
}

/// An ordered table of directives. Order is semantic: it defines
/// outer-to-inner nesting and is never changed after construction.
#[derive(Clone, Debug, Default)]
pub struct DirectiveTable {
    directives: Vec<Directive>,
}

impl DirectiveTable {
    pub fn new() -> Self {
        DirectiveTable {
            directives: Vec::new(),
        }
    }

    pub fn push(&mut self, directive: Directive) {
        self.directives.push(directive);
    }

    pub fn len(&self) -> usize {
        self.directives.len()
    }

    pub fn is_empty(&self) -> bool {
        self.directives.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &Directive> {
        self.directives.iter()
    }

    pub fn get(&self, pos: usize) -> Option<&Directive> {
        self.directives.get(pos)
    }

    pub fn get_mut(&mut self, pos: usize) -> Option<&mut Directive> {
        self.directives.get_mut(pos)
    }

    /// All directives on `var`, in table order.
    pub fn find(&self, var: &str) -> Vec<&Directive> {
        self.directives.iter().filter(|d| d.var() == var).collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn accessors_default_to_one() {
        let d = Directive::Unroll {
            var: "K".to_string(),
        };
        assert_eq!(d.size(), 1);
        assert_eq!(d.offset(), 1);
    }

    #[test]
    fn table_preserves_order() {
        let mut t = DirectiveTable::new();
        t.push(Directive::Tile {
            var: "K".to_string(),
            tile_size: 4,
        });
        t.push(Directive::SpatialMap {
            var: "K".to_string(),
            size: 1,
            offset: 1,
            num_components: 1,
        });
        assert_eq!(t.len(), 2);
        assert!(t.get(0).unwrap().is_tile());
        assert!(t.get(1).unwrap().is_spatial_map());
    }
}
