/*
 * PanSim
 * Copyright (c) 2020  ThoughtWorks, Inc.
 *
 * This program is free software: you can redistribute it and/or modify
 * it under the terms of the GNU Affero General Public License as published by
 * the Free Software Foundation, either version 3 of the License, or
 * (at your option) any later version.
 *
 * This program is distributed in the hope that it will be useful,
 * but WITHOUT ANY WARRANTY; without even the implied warranty of
 * MERCHANTABILITY or FITNESS FOR A PARTICULAR PURPOSE.  See the
 * GNU Affero General Public License for more details.
 *
 * You should have received a copy of the GNU Affero General Public License
 * along with this program.  If not, see <http://www.gnu.org/licenses/>.
 *
 */

//! Declarative disease model: state, group and behavior vocabularies, the
//! derived transmission tensor, and the progression / dwell-time samplers.
//! Everything here is validated and pre-computed at load; the structure is
//! immutable afterwards and shared by reference within a rank.

use std::collections::HashMap;
use std::fs;
use std::path::Path;

use fxhash::FxHashMap;
use ndarray::{Array2, Array6};
use serde::Deserialize;

use crate::disease::sampler::{CategoricalSampler, Sampler};
use crate::error::{Error, Result};

#[derive(Debug, Deserialize)]
struct DistributionSpec {
    dist: String,
    categories: Option<Vec<i64>>,
    p: Option<Vec<f64>>,
    value: Option<i64>,
}

/// The on-disk shape of the model file.
#[derive(Debug, Deserialize)]
struct ModelFile {
    states: Vec<String>,
    groups: Vec<String>,
    behaviors: Vec<String>,
    #[serde(default)]
    susceptibility: HashMap<String, HashMap<String, f64>>,
    #[serde(default)]
    infectivity: HashMap<String, HashMap<String, f64>>,
    #[serde(default)]
    behavior_modifier: HashMap<String, HashMap<String, f64>>,
    #[serde(default)]
    progression: HashMap<String, HashMap<String, HashMap<String, f64>>>,
    #[serde(default)]
    distribution: HashMap<String, DistributionSpec>,
    #[serde(default)]
    dwell_time: HashMap<String, HashMap<String, HashMap<String, String>>>,
    unit_time: f64,
    exposed_state: String,
}

pub struct DiseaseModel {
    states: Vec<String>,
    groups: Vec<String>,
    behaviors: Vec<String>,
    unit_time: f64,
    exposed_state: i8,

    /// Per (state, group); zero when the model file has no entry.
    susceptibility: Array2<f64>,
    infectivity: Array2<f64>,

    /// Compacted index over states with a susceptibility / infectivity entry.
    susc_state_index: Vec<Option<usize>>,
    infc_state_index: Vec<Option<usize>>,

    /// (susc state, group, behavior, infc state, group, behavior), with the
    /// state axes in the compacted indexes.
    transmission_prob: Array6<f64>,

    /// state -> per-group categorical sampler over next states.
    progression: FxHashMap<i8, Vec<CategoricalSampler>>,
    /// state -> group -> next state -> dwell-time sampler.
    dwell_time: FxHashMap<i8, Vec<FxHashMap<i8, Sampler>>>,
}

fn name_index(names: &[String], kind: &str) -> Result<FxHashMap<String, usize>> {
    let mut index = FxHashMap::default();
    for (i, name) in names.iter().enumerate() {
        if index.insert(name.clone(), i).is_some() {
            return Err(Error::InvalidModel(format!("duplicate {} name {}", kind, name)));
        }
    }
    Ok(index)
}

fn lookup(index: &FxHashMap<String, usize>, kind: &str, name: &str) -> Result<usize> {
    index
        .get(name)
        .copied()
        .ok_or_else(|| Error::InvalidModel(format!("unknown {} name {}", kind, name)))
}

impl DiseaseModel {
    pub fn load(path: &Path) -> Result<DiseaseModel> {
        let text = fs::read_to_string(path)?;
        DiseaseModel::from_str(&text)
    }

    pub fn from_str(text: &str) -> Result<DiseaseModel> {
        let file: ModelFile = serde_yaml::from_str(text)?;
        DiseaseModel::build(file)
    }

    fn build(file: ModelFile) -> Result<DiseaseModel> {
        let state_index = name_index(&file.states, "state")?;
        let group_index = name_index(&file.groups, "group")?;
        let behavior_index = name_index(&file.behaviors, "behavior")?;

        let n_states = file.states.len();
        let n_groups = file.groups.len();
        let n_behaviors = file.behaviors.len();

        if file.unit_time <= 0.0 {
            return Err(Error::InvalidModel(format!(
                "unit_time must be positive, got {}",
                file.unit_time
            )));
        }
        let exposed_state = lookup(&state_index, "state", &file.exposed_state)? as i8;

        let susceptibility =
            build_state_group_table(&file.susceptibility, "susceptibility", &state_index, &group_index, n_states, n_groups)?;
        let infectivity =
            build_state_group_table(&file.infectivity, "infectivity", &state_index, &group_index, n_states, n_groups)?;

        let mut behavior_modifier = Array2::<f64>::ones((n_behaviors, n_behaviors));
        for (s_name, row) in &file.behavior_modifier {
            let sb = lookup(&behavior_index, "behavior", s_name)?;
            for (i_name, &value) in row {
                let ib = lookup(&behavior_index, "behavior", i_name)?;
                if value < 0.0 {
                    return Err(Error::InvalidModel(format!(
                        "behavior_modifier[{}][{}] is negative",
                        s_name, i_name
                    )));
                }
                behavior_modifier[[sb, ib]] = value;
            }
        }

        // Compact the state axis of the tensor to states that can actually
        // take part in transmission.
        let mut susc_state_index = vec![None; n_states];
        let mut susc_states = Vec::new();
        for s in 0..n_states {
            if file.susceptibility.contains_key(&file.states[s]) {
                susc_state_index[s] = Some(susc_states.len());
                susc_states.push(s);
            }
        }
        let mut infc_state_index = vec![None; n_states];
        let mut infc_states = Vec::new();
        for s in 0..n_states {
            if file.infectivity.contains_key(&file.states[s]) {
                infc_state_index[s] = Some(infc_states.len());
                infc_states.push(s);
            }
        }

        let shape = (
            susc_states.len(),
            n_groups,
            n_behaviors,
            infc_states.len(),
            n_groups,
            n_behaviors,
        );
        let mut transmission_prob = Array6::<f64>::zeros(shape);
        for (ssi, &ss) in susc_states.iter().enumerate() {
            for (isi, &is) in infc_states.iter().enumerate() {
                for sg in 0..n_groups {
                    for ig in 0..n_groups {
                        for sb in 0..n_behaviors {
                            for ib in 0..n_behaviors {
                                let prob = susceptibility[[ss, sg]]
                                    * infectivity[[is, ig]]
                                    * behavior_modifier[[sb, ib]];
                                if !(0.0..=1.0).contains(&prob) {
                                    return Err(Error::InvalidModel(format!(
                                        "transmission probability {} for ({}, {}, {}) x ({}, {}, {}) is outside [0, 1]",
                                        prob,
                                        file.states[ss],
                                        file.groups[sg],
                                        file.behaviors[sb],
                                        file.states[is],
                                        file.groups[ig],
                                        file.behaviors[ib],
                                    )));
                                }
                                transmission_prob[[ssi, sg, sb, isi, ig, ib]] = prob;
                            }
                        }
                    }
                }
            }
        }

        let mut progression: FxHashMap<i8, Vec<CategoricalSampler>> = FxHashMap::default();
        for (s_name, per_group) in &file.progression {
            let state = lookup(&state_index, "state", s_name)? as i8;
            let mut samplers = Vec::with_capacity(n_groups);
            for g_name in &file.groups {
                let dist = per_group.get(g_name).ok_or_else(|| {
                    Error::InvalidModel(format!(
                        "progression for state {} is missing group {}",
                        s_name, g_name
                    ))
                })?;
                let mut pairs = Vec::with_capacity(dist.len());
                for (next_name, &p) in dist {
                    let next = lookup(&state_index, "state", next_name)? as i64;
                    pairs.push((next, p));
                }
                pairs.sort_by_key(|&(next, _)| next);
                samplers.push(CategoricalSampler::new(&pairs)?);
            }
            progression.insert(state, samplers);
        }

        let distributions = build_distributions(&file.distribution)?;

        let mut dwell_time: FxHashMap<i8, Vec<FxHashMap<i8, Sampler>>> = FxHashMap::default();
        for (s_name, per_group) in &file.dwell_time {
            let state = lookup(&state_index, "state", s_name)? as i8;
            let mut groups = Vec::with_capacity(n_groups);
            for g_name in &file.groups {
                let per_next = per_group.get(g_name).ok_or_else(|| {
                    Error::InvalidModel(format!(
                        "dwell_time for state {} is missing group {}",
                        s_name, g_name
                    ))
                })?;
                let mut samplers = FxHashMap::default();
                for (next_name, dist_name) in per_next {
                    let next = lookup(&state_index, "state", next_name)? as i8;
                    let sampler = distributions.get(dist_name).ok_or_else(|| {
                        Error::InvalidModel(format!("unknown distribution name {}", dist_name))
                    })?;
                    samplers.insert(next, sampler.clone());
                }
                groups.push(samplers);
            }
            dwell_time.insert(state, groups);
        }

        // Every transition the progression tables can select needs a
        // dwell-time sampler.
        for (&state, per_group) in &progression {
            for (g, sampler) in per_group.iter().enumerate() {
                for &next in sampler.values() {
                    let covered = dwell_time
                        .get(&state)
                        .and_then(|groups| groups[g].get(&(next as i8)))
                        .is_some();
                    if !covered {
                        return Err(Error::InvalidModel(format!(
                            "no dwell_time for transition {} -> {} in group {}",
                            file.states[state as usize], file.states[next as usize], file.groups[g]
                        )));
                    }
                }
            }
        }

        Ok(DiseaseModel {
            states: file.states,
            groups: file.groups,
            behaviors: file.behaviors,
            unit_time: file.unit_time,
            exposed_state,
            susceptibility,
            infectivity,
            susc_state_index,
            infc_state_index,
            transmission_prob,
            progression,
            dwell_time,
        })
    }

    pub fn n_states(&self) -> usize {
        self.states.len()
    }

    pub fn n_groups(&self) -> usize {
        self.groups.len()
    }

    pub fn n_behaviors(&self) -> usize {
        self.behaviors.len()
    }

    pub fn state_names(&self) -> &[String] {
        &self.states
    }

    pub fn unit_time(&self) -> f64 {
        self.unit_time
    }

    pub fn exposed_state(&self) -> i8 {
        self.exposed_state
    }

    pub fn susceptibility(&self, state: i8, group: i8) -> f64 {
        self.susceptibility[[state as usize, group as usize]]
    }

    pub fn infectivity(&self, state: i8, group: i8) -> f64 {
        self.infectivity[[state as usize, group as usize]]
    }

    pub(crate) fn susc_index(&self, state: i8) -> Option<usize> {
        self.susc_state_index[state as usize]
    }

    pub(crate) fn infc_index(&self, state: i8) -> Option<usize> {
        self.infc_state_index[state as usize]
    }

    /// Transmission probability per unit time; state axes take the compacted
    /// indexes returned by `susc_index` / `infc_index`.
    pub(crate) fn transmission_prob(
        &self,
        susc: usize,
        s_group: i8,
        s_behavior: i8,
        infc: usize,
        i_group: i8,
        i_behavior: i8,
    ) -> f64 {
        self.transmission_prob[[
            susc,
            s_group as usize,
            s_behavior as usize,
            infc,
            i_group as usize,
            i_behavior as usize,
        ]]
    }

    /// Run the contact kernel over one location's visits.
    pub fn compute_visit_output(
        &self,
        visits: &crate::disease::transmission::VisitColumns<'_>,
    ) -> crate::disease::transmission::VisitResult {
        crate::disease::transmission::compute_visit_output(self, visits)
    }

    /// Advance one person by one tick.
    pub fn compute_progression_output(
        &self,
        state: &crate::disease::progression::PersonState,
        inf_probs: &[f64],
        tick_time: i32,
    ) -> crate::disease::progression::PersonState {
        crate::disease::progression::compute_progression_output(self, state, inf_probs, tick_time)
    }

    pub fn progression_sampler(&self, state: i8, group: i8) -> Option<&CategoricalSampler> {
        self.progression.get(&state).map(|groups| &groups[group as usize])
    }

    pub fn dwell_sampler(&self, state: i8, group: i8, next: i8) -> Option<&Sampler> {
        self.dwell_time
            .get(&state)
            .and_then(|groups| groups[group as usize].get(&next))
    }
}

fn build_state_group_table(
    table: &HashMap<String, HashMap<String, f64>>,
    kind: &str,
    state_index: &FxHashMap<String, usize>,
    group_index: &FxHashMap<String, usize>,
    n_states: usize,
    n_groups: usize,
) -> Result<Array2<f64>> {
    let mut out = Array2::<f64>::zeros((n_states, n_groups));
    for (s_name, row) in table {
        let s = lookup(state_index, "state", s_name)?;
        for (g_name, &value) in row {
            let g = lookup(group_index, "group", g_name)?;
            if !(0.0..=1.0).contains(&value) {
                return Err(Error::InvalidModel(format!(
                    "{}[{}][{}] = {} is outside [0, 1]",
                    kind, s_name, g_name, value
                )));
            }
            out[[s, g]] = value;
        }
    }
    Ok(out)
}

fn build_distributions(specs: &HashMap<String, DistributionSpec>) -> Result<FxHashMap<String, Sampler>> {
    let mut out = FxHashMap::default();
    for (name, spec) in specs {
        let sampler = match spec.dist.as_str() {
            "fixed" => {
                let value = spec.value.ok_or_else(|| {
                    Error::InvalidModel(format!("fixed distribution {} has no value", name))
                })?;
                Sampler::Fixed(value)
            }
            "categorical" => {
                let categories = spec.categories.as_ref().ok_or_else(|| {
                    Error::InvalidModel(format!("categorical distribution {} has no categories", name))
                })?;
                let p = spec.p.as_ref().ok_or_else(|| {
                    Error::InvalidModel(format!("categorical distribution {} has no probabilities", name))
                })?;
                if categories.len() != p.len() {
                    return Err(Error::InvalidModel(format!(
                        "distribution {} has {} categories but {} probabilities",
                        name,
                        categories.len(),
                        p.len()
                    )));
                }
                let pairs: Vec<(i64, f64)> =
                    categories.iter().copied().zip(p.iter().copied()).collect();
                Sampler::Categorical(CategoricalSampler::new(&pairs)?)
            }
            other => {
                return Err(Error::InvalidModel(format!(
                    "unknown distribution family {}; only categorical and fixed are supported",
                    other
                )))
            }
        };
        out.insert(name.clone(), sampler);
    }
    Ok(out)
}

#[cfg(test)]
mod tests {
    use super::*;

    const SEIR_MODEL: &str = r#"
states: [S, E, I, R]
groups: [adult]
behaviors: [base]
susceptibility:
  S: {adult: 1.0}
infectivity:
  I: {adult: 1.0}
behavior_modifier:
  base: {base: 1.0}
progression:
  E:
    adult: {I: 1.0}
  I:
    adult: {R: 1.0}
distribution:
  d3: {dist: fixed, value: 3}
  dcat: {dist: categorical, categories: [2, 4], p: [0.5, 0.5]}
dwell_time:
  E:
    adult: {I: d3}
  I:
    adult: {R: dcat}
unit_time: 1.0
exposed_state: E
"#;

    #[test]
    fn should_load_model() {
        let model = DiseaseModel::from_str(SEIR_MODEL).unwrap();
        assert_eq!(model.n_states(), 4);
        assert_eq!(model.n_groups(), 1);
        assert_eq!(model.exposed_state(), 1);
        assert_eq!(model.susceptibility(0, 0), 1.0);
        assert_eq!(model.susceptibility(1, 0), 0.0);
        assert_eq!(model.infectivity(2, 0), 1.0);

        let si = model.susc_index(0).unwrap();
        let ii = model.infc_index(2).unwrap();
        assert_eq!(model.transmission_prob(si, 0, 0, ii, 0, 0), 1.0);

        assert!(model.susc_index(2).is_none());
        assert!(model.infc_index(0).is_none());
        assert!(model.progression_sampler(1, 0).is_some());
        assert!(model.progression_sampler(0, 0).is_none());
        assert!(model.dwell_sampler(1, 0, 2).is_some());
    }

    #[test]
    fn should_reject_unknown_state_reference() {
        let text = SEIR_MODEL.replace("exposed_state: E", "exposed_state: X");
        assert!(matches!(
            DiseaseModel::from_str(&text),
            Err(Error::InvalidModel(_))
        ));
    }

    #[test]
    fn should_reject_unknown_distribution_family() {
        let text = SEIR_MODEL.replace("dist: fixed", "dist: geometric");
        assert!(matches!(
            DiseaseModel::from_str(&text),
            Err(Error::InvalidModel(_))
        ));
    }

    #[test]
    fn should_reject_bad_progression_sum() {
        let text = SEIR_MODEL.replace("adult: {I: 1.0}", "adult: {I: 0.7}");
        assert!(matches!(
            DiseaseModel::from_str(&text),
            Err(Error::InvalidModel(_))
        ));
    }

    #[test]
    fn should_reject_transmission_prob_above_one() {
        let text = SEIR_MODEL.replace("base: {base: 1.0}", "base: {base: 1.5}");
        assert!(matches!(
            DiseaseModel::from_str(&text),
            Err(Error::InvalidModel(_))
        ));
    }

    #[test]
    fn should_reject_missing_dwell_time() {
        let text = SEIR_MODEL.replace("adult: {R: dcat}", "adult: {}");
        assert!(matches!(
            DiseaseModel::from_str(&text),
            Err(Error::InvalidModel(_))
        ));
    }

    #[test]
    fn should_reject_nonpositive_unit_time() {
        let text = SEIR_MODEL.replace("unit_time: 1.0", "unit_time: 0.0");
        assert!(matches!(
            DiseaseModel::from_str(&text),
            Err(Error::InvalidModel(_))
        ));
    }
}
