//! The mapping analyzer: turns an ordered directive list, a loop-bound
//! table and a PE count into the derived per-variable quantities every
//! other component queries.
use fxhash::FxHashMap;

use crate::error::{ModelError, Result};
use crate::ir::{Directive, DirectiveTable, Loop, LoopTable, Tensor};
use crate::model::Mode;

fn at_least_one(n: i64) -> i64 {
    std::cmp::max(1, n)
}

/// Owns the directive and loop tables for one analysis and the full set of
/// quantities `preprocess` derives from them.
///
/// Queries fail with `ModelError::StalePreprocess` if called before
/// `preprocess` has run, or again after a `set_map_size` call that hasn't
/// been followed by a fresh `preprocess`. Derived maps are never served
/// stale.
pub struct MappingAnalyzer {
    directives: DirectiveTable,
    loops: LoopTable,
    num_pes: i64,
    mode: Mode,
    dirty: bool,

    num_tiles: FxHashMap<String, i64>,
    mapped: FxHashMap<String, i64>,
    sp_unique: FxHashMap<String, i64>,
    tp_unique: FxHashMap<String, i64>,
    sp_reused: FxHashMap<String, i64>,
    tp_reused: FxHashMap<String, i64>,
    is_unrolled: FxHashMap<String, bool>,
    is_merged: FxHashMap<String, bool>,

    spatial_map_points: Vec<(String, usize)>,
    spatial_foldings: Vec<(String, i64)>,
    num_edge_tiles: i64,
    num_temporal_iterations: Vec<i64>,
}

impl MappingAnalyzer {
    pub fn new(directives: DirectiveTable, loops: LoopTable, num_pes: i64, mode: Mode) -> Self {
        MappingAnalyzer {
            directives,
            loops,
            num_pes,
            mode,
            dirty: true,
            num_tiles: FxHashMap::default(),
            mapped: FxHashMap::default(),
            sp_unique: FxHashMap::default(),
            tp_unique: FxHashMap::default(),
            sp_reused: FxHashMap::default(),
            tp_reused: FxHashMap::default(),
            is_unrolled: FxHashMap::default(),
            is_merged: FxHashMap::default(),
            spatial_map_points: Vec::new(),
            spatial_foldings: Vec::new(),
            num_edge_tiles: 1,
            num_temporal_iterations: Vec::new(),
        }
    }

    pub fn directives(&self) -> &DirectiveTable {
        &self.directives
    }

    pub fn loops(&self) -> &LoopTable {
        &self.loops
    }

    /// Clears the spatial-layer results (`spatial_map_points`,
    /// `spatial_foldings`) but keeps per-variable maps. Mirrors the
    /// narrower of the two resets the analyzer exposes.
    pub fn reset(&mut self) {
        self.spatial_map_points.clear();
        self.spatial_foldings.clear();
        self.dirty = true;
    }

    /// Clears every derived quantity. Directives and loops are untouched.
    pub fn full_reset(&mut self) {
        self.num_tiles.clear();
        self.mapped.clear();
        self.sp_unique.clear();
        self.tp_unique.clear();
        self.sp_reused.clear();
        self.tp_reused.clear();
        self.is_unrolled.clear();
        self.is_merged.clear();
        self.spatial_map_points.clear();
        self.spatial_foldings.clear();
        self.num_edge_tiles = 1;
        self.num_temporal_iterations.clear();
        self.dirty = true;
    }

    /// Rewrites the size and offset of the first TemporalMap/SpatialMap
    /// directive on `var`, in place, for search-driven callers that want to
    /// try alternate mappings without rebuilding the directive table.
    /// Leaves the analyzer dirty; queries fail until `preprocess` reruns.
    pub fn set_map_size(&mut self, var: &str, size: i64, offset: i64) -> Result<()> {
        let pos = self
            .directives
            .iter()
            .position(|d| d.var() == var && (d.is_temporal_map() || d.is_spatial_map()))
            .ok_or_else(|| ModelError::MissingLoop {
                var: var.to_string(),
            })?;
        match self.directives.get_mut(pos) {
            Some(Directive::TemporalMap { size: s, offset: o, .. }) => {
                *s = size;
                *o = offset;
            }
            Some(Directive::SpatialMap { size: s, offset: o, .. }) => {
                *s = size;
                *o = offset;
            }
            _ => unreachable!("position found above is always a map directive"),
        }
        self.dirty = true;
        Ok(())
    }

    fn loop_iter(&self, var: &str) -> Result<i64> {
        self.loops
            .find_loop(var)
            .map(Loop::num_iter)
            .ok_or_else(|| ModelError::MissingLoop {
                var: var.to_string(),
            })
    }

    /// Runs the six analysis phases in order and clears the dirty flag.
    /// Phase order is load-bearing: later phases read maps earlier phases
    /// populate.
    pub fn preprocess(&mut self) -> Result<()> {
        self.full_reset();
        self.analyze_spatial_map_points();
        self.analyze_num_tiles();
        self.analyze_temporal_iterations()?;
        self.analyze_unroll_merge();
        self.analyze_map_sizes()?;
        self.analyze_spatial_foldings()?;
        self.dirty = false;
        Ok(())
    }

    fn analyze_spatial_map_points(&mut self) {
        for (idx, d) in self.directives.iter().enumerate() {
            if d.is_spatial_map() {
                self.spatial_map_points.push((d.var().to_string(), idx));
            }
        }
    }

    fn analyze_num_tiles(&mut self) {
        let mut curr = self.num_pes;
        for d in self.directives.iter() {
            if let Directive::Tile { tile_size, .. } = d {
                let divisor = at_least_one(*tile_size);
                if curr % divisor != 0 {
                    log::warn!(
                        "cluster size {} does not evenly divide {} available tiles for `{}`",
                        divisor,
                        curr,
                        d.var()
                    );
                }
                curr /= divisor;
            }
            self.num_tiles.insert(d.var().to_string(), curr);
        }
    }

    /// The window for each spatial-map point is always `[curr_base,
    /// directive_count)` in `Mode::Compat`, regardless of the spatial-map
    /// directive's own position, so multiple spatial-map points double-count
    /// against each other. `Mode::Strict` uses
    /// `[curr_base, spatial_map_index)` instead, so each point only sees
    /// directives actually nested above it.
    fn analyze_temporal_iterations(&mut self) -> Result<()> {
        let directive_count = self.directives.len();
        let mut curr_base = 0usize;
        for (_, sm_idx) in self.spatial_map_points.clone() {
            let curr_bound = match self.mode {
                Mode::Compat => directive_count,
                Mode::Strict => sm_idx,
            };
            let mut num_temp_iter = 1i64;
            for pos in curr_base..curr_bound.min(directive_count) {
                let d = self
                    .directives
                    .get(pos)
                    .expect("pos bounded by directive_count");
                if d.is_tile() || d.is_spatial_map() {
                    continue;
                }
                if d.is_unroll() {
                    continue;
                }
                let n = self.loop_iter(d.var())?;
                let m = at_least_one(n / at_least_one(d.offset()));
                num_temp_iter *= m;
            }
            self.num_temporal_iterations.push(num_temp_iter);
            curr_base = curr_bound;
        }
        Ok(())
    }

    fn analyze_unroll_merge(&mut self) {
        for d in self.directives.iter() {
            self.is_unrolled.insert(d.var().to_string(), false);
            self.is_merged.insert(d.var().to_string(), false);
        }
        for d in self.directives.iter() {
            match d {
                Directive::Unroll { var } => {
                    self.is_unrolled.insert(var.clone(), true);
                }
                Directive::Merge { var } => {
                    self.is_merged.insert(var.clone(), true);
                }
                _ => {}
            }
        }
    }

    fn analyze_map_sizes(&mut self) -> Result<()> {
        for d in self.directives.iter() {
            let v = d.var();
            let unrolled = *self.is_unrolled.get(v).unwrap_or(&false);
            let merged = *self.is_merged.get(v).unwrap_or(&false);
            match d {
                Directive::TemporalMap { size, offset, .. } => {
                    if unrolled || merged {
                        return Err(ModelError::ConfigConflict { var: v.to_string() });
                    }
                    self.mapped.insert(v.to_string(), *size);
                    self.tp_unique.insert(v.to_string(), std::cmp::min(*size, *offset));
                    self.sp_unique.insert(v.to_string(), *size);
                    self.tp_reused
                        .insert(v.to_string(), std::cmp::max(0, size - offset));
                    self.sp_reused.insert(v.to_string(), 0);
                }
                Directive::SpatialMap { size, offset, .. } => {
                    if unrolled || merged {
                        return Err(ModelError::ConfigConflict { var: v.to_string() });
                    }
                    self.mapped.insert(v.to_string(), *size);
                    self.tp_unique.insert(v.to_string(), *size);
                    self.sp_unique.insert(v.to_string(), std::cmp::min(*size, *offset));
                    self.tp_reused.insert(v.to_string(), 0);
                    self.sp_reused
                        .insert(v.to_string(), std::cmp::max(0, size - offset));
                }
                Directive::Unroll { .. } => {
                    let n = self.loop_iter(v)?;
                    self.mapped.insert(v.to_string(), n);
                    self.tp_unique.insert(v.to_string(), n);
                    self.sp_unique.insert(v.to_string(), 1);
                    self.tp_reused.insert(v.to_string(), n);
                    self.sp_reused.insert(v.to_string(), n);
                }
                Directive::Merge { .. } | Directive::Tile { .. } => {}
            }
        }
        Ok(())
    }

    fn analyze_spatial_foldings(&mut self) -> Result<()> {
        let spatial_maps: Vec<(String, i64)> = self
            .directives
            .iter()
            .filter_map(|d| match d {
                Directive::SpatialMap { var, offset, .. } => Some((var.clone(), *offset)),
                _ => None,
            })
            .collect();
        for (var, offset) in spatial_maps {
            let n = self.loop_iter(&var)?;
            let num_sp_tiles = at_least_one(*self.num_tiles.get(&var).unwrap_or(&1));
            let q = n / at_least_one(offset);
            let num_spatial_foldings = at_least_one(q / num_sp_tiles);
            let mut num_edge = q % num_sp_tiles;
            if num_edge == 0 {
                num_edge = num_sp_tiles;
            }
            self.spatial_foldings.push((var, num_spatial_foldings));
            self.num_edge_tiles = num_edge;
        }
        Ok(())
    }

    fn ensure_fresh(&self) -> Result<()> {
        if self.dirty {
            Err(ModelError::StalePreprocess)
        } else {
            Ok(())
        }
    }

    fn multiplier_for(&self, var: &str, temporal_reuse: bool, spatial_reuse: bool) -> Result<i64> {
        let first = self.directives.find(var).into_iter().next();
        match first {
            Some(d) => {
                let pick = |map: &FxHashMap<String, i64>| *map.get(var).unwrap_or(&1);
                Ok(match (temporal_reuse, spatial_reuse) {
                    (true, true) => {
                        if d.is_spatial_map() {
                            pick(&self.sp_unique)
                        } else {
                            pick(&self.tp_unique)
                        }
                    }
                    (true, false) => pick(&self.tp_unique),
                    (false, true) => pick(&self.sp_unique),
                    (false, false) => pick(&self.mapped),
                })
            }
            None => self.loop_iter(var),
        }
    }

    /// Product over `tensor`'s variables of the per-variable multiplier
    /// selected by the reuse toggles, each taken from the first directive
    /// matching that variable.
    pub fn mapped_size(&self, tensor: &Tensor, temporal_reuse: bool, spatial_reuse: bool) -> Result<i64> {
        self.ensure_fresh()?;
        let mut product = 1i64;
        for v in &tensor.variables {
            product *= self.multiplier_for(v, temporal_reuse, spatial_reuse)?;
        }
        Ok(product)
    }

    /// Product of the raw iteration counts of `tensor`'s variables.
    pub fn full_size(&self, tensor: &Tensor) -> Result<i64> {
        self.ensure_fresh()?;
        let mut product = 1i64;
        for v in &tensor.variables {
            product *= self.loop_iter(v)?;
        }
        Ok(product)
    }

    /// How many temporal iterations a tensor's mapped tile stays constant
    /// for, used as a divisor in the traffic formulas.
    ///
    /// In `Mode::Compat`, once a directive on one of the tensor's variables
    /// is seen inside the window before the spatial-map point, every later
    /// directive in that window contributes to the count whether or not it
    /// also touches the tensor. `Mode::Strict` only counts directives that
    /// themselves reference the tensor.
    pub fn temporal_change_frequency(&self, tensor: &Tensor) -> Result<i64> {
        self.ensure_fresh()?;
        let (sm_var, sm_idx) = match self.spatial_map_points.first() {
            Some(p) => p.clone(),
            None => return Ok(1),
        };
        if tensor.variables.iter().any(|v| v == &sm_var) {
            return Ok(1);
        }
        let mut mult = 1i64;
        let mut saw_related = false;
        for (pos, d) in self.directives.iter().enumerate() {
            if pos >= sm_idx {
                break;
            }
            let is_related = tensor.variables.iter().any(|v| v == d.var());
            match self.mode {
                Mode::Compat => {
                    if is_related {
                        saw_related = true;
                    } else if saw_related {
                        mult *= self.window_contribution(d)?;
                    }
                }
                Mode::Strict => {
                    if is_related {
                        mult *= self.window_contribution(d)?;
                    }
                }
            }
        }
        Ok(mult)
    }

    fn window_contribution(&self, d: &Directive) -> Result<i64> {
        if d.is_unroll() {
            return Ok(1);
        }
        let n = self.loop_iter(d.var())?;
        Ok(at_least_one(n / at_least_one(d.size())))
    }

    /// `(var, num_tiles[var])` for every spatial-map point, in order.
    pub fn num_spatial_tiles(&self) -> Result<Vec<(String, i64)>> {
        self.ensure_fresh()?;
        Ok(self
            .spatial_map_points
            .iter()
            .map(|(v, _)| (v.clone(), *self.num_tiles.get(v).unwrap_or(&1)))
            .collect())
    }

    pub fn num_edge_tiles(&self) -> Result<i64> {
        self.ensure_fresh()?;
        Ok(self.num_edge_tiles)
    }

    pub fn num_spatial_foldings(&self) -> Result<i64> {
        self.ensure_fresh()?;
        Ok(self
            .spatial_foldings
            .first()
            .map(|(_, n)| *n)
            .unwrap_or(1))
    }

    pub fn num_temporal_iterations(&self) -> Result<i64> {
        self.ensure_fresh()?;
        Ok(*self.num_temporal_iterations.first().unwrap_or(&1))
    }

    pub fn total_iterations(&self) -> i64 {
        self.loops.total_iterations()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn trivial_analyzer() -> MappingAnalyzer {
        let mut loops = LoopTable::new();
        for v in ["K", "C", "R", "S", "Y", "X"] {
            loops.push(Loop::new(v, 1));
        }
        let mut directives = DirectiveTable::new();
        directives.push(Directive::SpatialMap {
            var: "K".to_string(),
            size: 1,
            offset: 1,
            num_components: 1,
        });
        MappingAnalyzer::new(directives, loops, 1, Mode::Compat)
    }

    fn weight(variables: &[&str]) -> Tensor {
        Tensor::new(
            "weight",
            variables.iter().map(|s| s.to_string()).collect(),
        )
    }

    #[test]
    fn trivial_scenario_matches_expected_values() {
        let mut a = trivial_analyzer();
        a.preprocess().unwrap();
        assert_eq!(a.num_temporal_iterations().unwrap(), 1);
        assert_eq!(a.num_spatial_foldings().unwrap(), 1);
        assert_eq!(a.num_edge_tiles().unwrap(), 1);
        let w = weight(&["K", "C", "R", "S"]);
        assert_eq!(a.mapped_size(&w, false, false).unwrap(), 1);
        assert_eq!(a.full_size(&w).unwrap(), 1);
    }

    #[test]
    fn query_before_preprocess_is_stale() {
        let a = trivial_analyzer();
        let w = weight(&["K"]);
        assert!(matches!(
            a.mapped_size(&w, false, false),
            Err(ModelError::StalePreprocess)
        ));
    }

    #[test]
    fn set_map_size_marks_analyzer_dirty() {
        let mut a = trivial_analyzer();
        a.preprocess().unwrap();
        a.set_map_size("K", 2, 1).unwrap();
        let w = weight(&["K"]);
        assert!(matches!(
            a.mapped_size(&w, false, false),
            Err(ModelError::StalePreprocess)
        ));
        a.preprocess().unwrap();
        assert_eq!(a.mapped_size(&w, false, false).unwrap(), 2);
    }

    #[test]
    fn output_stationary_scenario() {
        let mut loops = LoopTable::new();
        loops.push(Loop::new("K", 16));
        loops.push(Loop::new("C", 16));
        loops.push(Loop::new("R", 3));
        loops.push(Loop::new("S", 3));
        loops.push(Loop::new("Y", 8));
        loops.push(Loop::new("X", 8));
        let mut directives = DirectiveTable::new();
        directives.push(Directive::TemporalMap { var: "K".into(), size: 1, offset: 1 });
        directives.push(Directive::TemporalMap { var: "C".into(), size: 16, offset: 16 });
        directives.push(Directive::TemporalMap { var: "R".into(), size: 3, offset: 3 });
        directives.push(Directive::TemporalMap { var: "S".into(), size: 3, offset: 3 });
        directives.push(Directive::SpatialMap {
            var: "Y".into(),
            size: 1,
            offset: 1,
            num_components: 1,
        });
        directives.push(Directive::TemporalMap { var: "X".into(), size: 1, offset: 1 });
        let mut a = MappingAnalyzer::new(directives, loops, 8, Mode::Compat);
        a.preprocess().unwrap();
        assert_eq!(a.num_spatial_tiles().unwrap(), vec![("Y".to_string(), 8)]);
        assert_eq!(a.num_edge_tiles().unwrap(), 8);
        assert_eq!(a.num_spatial_foldings().unwrap(), 1);
        let w = weight(&["K", "C", "R", "S"]);
        assert_eq!(a.mapped_size(&w, false, false).unwrap(), 144);
        assert_eq!(a.full_size(&w).unwrap(), 2304);
    }

    #[test]
    fn spatial_folding_scenario_with_clustering() {
        let mut loops = LoopTable::new();
        loops.push(Loop::new("K", 64));
        loops.push(Loop::new("C", 16));
        loops.push(Loop::new("R", 3));
        loops.push(Loop::new("S", 3));
        loops.push(Loop::new("Y", 14));
        loops.push(Loop::new("X", 14));
        let mut directives = DirectiveTable::new();
        directives.push(Directive::Tile { var: "K".into(), tile_size: 4 });
        directives.push(Directive::SpatialMap {
            var: "K".into(),
            size: 1,
            offset: 1,
            num_components: 1,
        });
        directives.push(Directive::TemporalMap { var: "C".into(), size: 16, offset: 16 });
        directives.push(Directive::TemporalMap { var: "R".into(), size: 3, offset: 3 });
        directives.push(Directive::TemporalMap { var: "S".into(), size: 3, offset: 3 });
        directives.push(Directive::TemporalMap { var: "Y".into(), size: 1, offset: 1 });
        directives.push(Directive::TemporalMap { var: "X".into(), size: 1, offset: 1 });
        let mut a = MappingAnalyzer::new(directives, loops, 64, Mode::Compat);
        a.preprocess().unwrap();
        assert_eq!(a.num_spatial_tiles().unwrap(), vec![("K".to_string(), 16)]);
        assert_eq!(a.num_spatial_foldings().unwrap(), 4);
    }

    #[test]
    fn config_conflict_is_fatal() {
        let mut loops = LoopTable::new();
        loops.push(Loop::new("K", 4));
        let mut directives = DirectiveTable::new();
        directives.push(Directive::Unroll { var: "K".into() });
        directives.push(Directive::TemporalMap { var: "K".into(), size: 4, offset: 4 });
        let mut a = MappingAnalyzer::new(directives, loops, 1, Mode::Compat);
        assert!(matches!(
            a.preprocess(),
            Err(ModelError::ConfigConflict { .. })
        ));
    }

    #[test]
    fn missing_loop_for_directive_variable_is_reported() {
        let loops = LoopTable::new();
        let mut directives = DirectiveTable::new();
        directives.push(Directive::TemporalMap { var: "K".into(), size: 1, offset: 1 });
        let mut a = MappingAnalyzer::new(directives, loops, 1, Mode::Compat);
        assert!(matches!(a.preprocess(), Err(ModelError::MissingLoop { .. })));
    }

    #[test]
    fn temporal_iterations_double_count_in_compat_mode_with_two_spatial_points() {
        let mut loops = LoopTable::new();
        loops.push(Loop::new("K", 4));
        loops.push(Loop::new("C", 4));
        let mut directives = DirectiveTable::new();
        directives.push(Directive::SpatialMap {
            var: "K".into(),
            size: 1,
            offset: 1,
            num_components: 1,
        });
        directives.push(Directive::TemporalMap { var: "C".into(), size: 4, offset: 1 });
        directives.push(Directive::SpatialMap {
            var: "C".into(),
            size: 4,
            offset: 1,
            num_components: 1,
        });
        let mut compat = MappingAnalyzer::new(directives.clone(), loops.clone(), 1, Mode::Compat);
        compat.preprocess().unwrap();
        let mut strict = MappingAnalyzer::new(directives, loops, 1, Mode::Strict);
        strict.preprocess().unwrap();
        // Compat's window for the second spatial-map point starts where the
        // first one's window ended (the full directive count), so it never
        // walks directive 1 and records 1 rather than a reduced count.
        assert_eq!(compat.num_temporal_iterations, vec![4, 1]);
        assert_eq!(strict.num_temporal_iterations, vec![1, 4]);
    }
}
