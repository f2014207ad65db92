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

//! Contact and transmission kernel: a sweep-line over visit start/end
//! events at a single location. Per visit it produces the accumulated
//! infection probability, the number of distinct contacts, and per
//! visual-attribute contact counts.

use fxhash::FxHashSet;

use crate::disease::model::DiseaseModel;

/// Column views over the visits at one location for one tick.
pub struct VisitColumns<'a> {
    pub state: &'a [i8],
    pub group: &'a [i8],
    pub behavior: &'a [i8],
    pub start_time: &'a [i32],
    pub end_time: &'a [i32],
    /// One slice per visual attribute, each the length of the visit set.
    pub attrs: Vec<&'a [i8]>,
}

impl<'a> VisitColumns<'a> {
    pub fn len(&self) -> usize {
        self.state.len()
    }

    pub fn is_empty(&self) -> bool {
        self.state.is_empty()
    }
}

/// Per-visit kernel outputs, column-major like the inputs.
pub struct VisitResult {
    pub inf_prob: Vec<f64>,
    pub n_contacts: Vec<i32>,
    pub attrs: Vec<Vec<i32>>,
}

const END_EVENT: u8 = 0;
const START_EVENT: u8 = 1;

/// Add probabilities of independent events.
#[inline]
fn padd(p: f64, q: f64) -> f64 {
    1.0 - (1.0 - p) * (1.0 - q)
}

/// Probability of at least one success over `n` (fractional) trials.
#[inline]
fn pmul(p: f64, n: f64) -> f64 {
    1.0 - (1.0 - p).powf(n)
}

/// Run the sweep. The inputs must already be validated
/// (`start_time <= end_time`); out-of-range state/group/behavior indexes
/// are programmer errors and panic.
pub fn compute_visit_output(model: &DiseaseModel, visits: &VisitColumns<'_>) -> VisitResult {
    let n_visits = visits.len();
    let n_attrs = visits.attrs.len();

    let mut result = VisitResult {
        inf_prob: vec![0.0; n_visits],
        n_contacts: vec![0; n_visits],
        attrs: vec![vec![0; n_visits]; n_attrs],
    };
    if n_visits == 0 {
        return result;
    }

    // Events sorted by (time, END before START, visit index): endpoints that
    // coincide close departing visits before opening arriving ones.
    let mut events: Vec<(i32, u8, usize)> = Vec::with_capacity(2 * n_visits);
    for v in 0..n_visits {
        events.push((visits.start_time[v], START_EVENT, v));
        events.push((visits.end_time[v], END_EVENT, v));
    }
    events.sort_unstable();

    let mut cur_all: FxHashSet<usize> = FxHashSet::default();
    let mut cur_susc: FxHashSet<usize> = FxHashSet::default();
    let mut cur_infc: FxHashSet<usize> = FxHashSet::default();
    let mut cur_attr = vec![0i32; n_attrs];
    let mut cur_occupancy = 0i32;
    let mut prev_time: Option<i32> = None;

    for &(cur_time, event_type, v) in &events {
        // Accumulate transmission over [prev_time, cur_time].
        if let Some(prev) = prev_time {
            let duration = cur_time - prev;
            if duration > 0 && !cur_susc.is_empty() && !cur_infc.is_empty() {
                let duration = f64::from(duration) / model.unit_time();
                for &s in &cur_susc {
                    let ss = model
                        .susc_index(visits.state[s])
                        .expect("present visit left the susceptible table");
                    let sg = visits.group[s];
                    let sb = visits.behavior[s];
                    for &i in &cur_infc {
                        let is = model
                            .infc_index(visits.state[i])
                            .expect("present visit left the infectious table");
                        let ig = visits.group[i];
                        let ib = visits.behavior[i];

                        let p = model.transmission_prob(ss, sg, sb, is, ig, ib);
                        let p = pmul(p, duration);
                        result.inf_prob[s] = padd(result.inf_prob[s], p);
                    }
                }
            }
        }

        if event_type == START_EVENT {
            // The arriving visit sees what is already present.
            for a in 0..n_attrs {
                result.attrs[a][v] = cur_attr[a];
            }
            result.n_contacts[v] = cur_occupancy;

            // Everyone present sees the arriving visit.
            for (a, col) in visits.attrs.iter().enumerate() {
                if col[v] != 0 {
                    for &u in &cur_all {
                        result.attrs[a][u] += 1;
                    }
                }
            }
            for &u in &cur_all {
                result.n_contacts[u] += 1;
            }

            // A zero-length visit snapshots and is seen, but never becomes
            // present: its END event has already passed (END sorts before
            // START at equal times), so inserting it would leak membership.
            if visits.start_time[v] < visits.end_time[v] {
                cur_all.insert(v);
                if model.susceptibility(visits.state[v], visits.group[v]) > 0.0 {
                    cur_susc.insert(v);
                }
                if model.infectivity(visits.state[v], visits.group[v]) > 0.0 {
                    cur_infc.insert(v);
                }
                for (a, col) in visits.attrs.iter().enumerate() {
                    if col[v] != 0 {
                        cur_attr[a] += 1;
                    }
                }
                cur_occupancy += 1;
            }
        } else if cur_all.remove(&v) {
            cur_susc.remove(&v);
            cur_infc.remove(&v);
            for (a, col) in visits.attrs.iter().enumerate() {
                if col[v] != 0 {
                    cur_attr[a] -= 1;
                }
            }
            cur_occupancy -= 1;
        }

        prev_time = Some(cur_time);
    }

    result
}

#[cfg(test)]
mod tests {
    use approx::assert_abs_diff_eq;

    use super::*;
    use crate::disease::model::DiseaseModel;

    const PAIR_MODEL: &str = r#"
states: [S, E, I, R]
groups: [adult]
behaviors: [base]
susceptibility:
  S: {adult: 1.0}
infectivity:
  I: {adult: 1.0}
behavior_modifier:
  base: {base: 1.0}
progression: {}
distribution: {}
dwell_time: {}
unit_time: 1.0
exposed_state: E
"#;

    fn pair_model() -> DiseaseModel {
        DiseaseModel::from_str(PAIR_MODEL).unwrap()
    }

    fn no_infectivity_model() -> DiseaseModel {
        let text = PAIR_MODEL.replace("I: {adult: 1.0}", "I: {adult: 0.0}");
        DiseaseModel::from_str(&text).unwrap()
    }

    struct Fixture {
        state: Vec<i8>,
        group: Vec<i8>,
        behavior: Vec<i8>,
        start_time: Vec<i32>,
        end_time: Vec<i32>,
        attrs: Vec<Vec<i8>>,
    }

    impl Fixture {
        fn new(rows: &[(i8, i32, i32)], attrs: Vec<Vec<i8>>) -> Fixture {
            Fixture {
                state: rows.iter().map(|r| r.0).collect(),
                group: vec![0; rows.len()],
                behavior: vec![0; rows.len()],
                start_time: rows.iter().map(|r| r.1).collect(),
                end_time: rows.iter().map(|r| r.2).collect(),
                attrs,
            }
        }

        fn columns(&self) -> VisitColumns<'_> {
            VisitColumns {
                state: &self.state,
                group: &self.group,
                behavior: &self.behavior,
                start_time: &self.start_time,
                end_time: &self.end_time,
                attrs: self.attrs.iter().map(|a| a.as_slice()).collect(),
            }
        }
    }

    const S: i8 = 0;
    const I: i8 = 2;

    #[test]
    fn isolated_visit_sees_nothing() {
        let model = no_infectivity_model();
        let fixture = Fixture::new(&[(S, 0, 10)], vec![vec![0]]);
        let out = compute_visit_output(&model, &fixture.columns());

        assert_eq!(out.inf_prob, vec![0.0]);
        assert_eq!(out.n_contacts, vec![0]);
        assert_eq!(out.attrs[0], vec![0]);
    }

    #[test]
    fn pairwise_exposure_full_overlap() {
        let model = pair_model();
        let fixture = Fixture::new(&[(S, 0, 10), (I, 0, 10)], vec![]);
        let out = compute_visit_output(&model, &fixture.columns());

        // p = 1 per unit time over 10 units.
        assert_abs_diff_eq!(out.inf_prob[0], 1.0);
        assert_eq!(out.inf_prob[1], 0.0);
        assert_eq!(out.n_contacts, vec![1, 1]);
    }

    #[test]
    fn pairwise_exposure_half_probability() {
        let text = PAIR_MODEL.replace("S: {adult: 1.0}", "S: {adult: 0.5}");
        let model = DiseaseModel::from_str(&text).unwrap();
        let fixture = Fixture::new(&[(S, 0, 2), (I, 0, 2)], vec![]);
        let out = compute_visit_output(&model, &fixture.columns());

        // 1 - (1 - 0.5)^2 over the single two-unit slice.
        assert_abs_diff_eq!(out.inf_prob[0], 0.75, epsilon = 1e-12);
    }

    #[test]
    fn touch_at_endpoint_is_no_contact() {
        let model = pair_model();
        let fixture = Fixture::new(&[(I, 0, 5), (S, 5, 10)], vec![]);
        let out = compute_visit_output(&model, &fixture.columns());

        assert_eq!(out.inf_prob, vec![0.0, 0.0]);
        assert_eq!(out.n_contacts, vec![0, 0]);
    }

    #[test]
    fn zero_length_visit_sees_occupancy_at_arrival() {
        let model = no_infectivity_model();
        let fixture = Fixture::new(&[(S, 0, 10), (S, 5, 5)], vec![]);
        let out = compute_visit_output(&model, &fixture.columns());

        assert_eq!(out.n_contacts, vec![1, 1]);
        assert_eq!(out.inf_prob, vec![0.0, 0.0]);
    }

    #[test]
    fn attribute_counting_over_three_overlaps() {
        let model = no_infectivity_model();
        let fixture = Fixture::new(
            &[(S, 0, 10), (S, 2, 8), (S, 4, 6)],
            vec![vec![1, 0, 1]],
        );
        let out = compute_visit_output(&model, &fixture.columns());

        assert_eq!(out.attrs[0], vec![1, 2, 1]);
        assert_eq!(out.n_contacts, vec![2, 2, 2]);
    }

    #[test]
    fn no_infectious_present_means_zero_probability() {
        let model = no_infectivity_model();
        let fixture = Fixture::new(&[(S, 0, 10), (I, 0, 10), (S, 3, 7)], vec![]);
        let out = compute_visit_output(&model, &fixture.columns());

        assert_eq!(out.inf_prob, vec![0.0, 0.0, 0.0]);
    }

    #[test]
    fn simultaneous_starts_commute() {
        let model = pair_model();
        let forward = Fixture::new(&[(S, 0, 10), (I, 0, 10), (S, 0, 10)], vec![vec![1, 1, 0]]);
        let swapped = Fixture::new(&[(S, 0, 10), (S, 0, 10), (I, 0, 10)], vec![vec![1, 0, 1]]);

        let a = compute_visit_output(&model, &forward.columns());
        let b = compute_visit_output(&model, &swapped.columns());

        // Visit 0 is identical in both orderings; the other two trade places.
        assert_eq!(a.n_contacts[0], b.n_contacts[0]);
        assert_eq!(a.attrs[0][0], b.attrs[0][0]);
        assert_abs_diff_eq!(a.inf_prob[0], b.inf_prob[0], epsilon = 1e-12);
        assert_eq!(a.n_contacts[1], b.n_contacts[2]);
        assert_eq!(a.n_contacts[2], b.n_contacts[1]);
        assert_abs_diff_eq!(a.inf_prob[1], b.inf_prob[2], epsilon = 1e-12);
        assert_abs_diff_eq!(a.inf_prob[2], b.inf_prob[1], epsilon = 1e-12);
    }

    #[test]
    fn probability_stays_within_bounds() {
        let model = pair_model();
        let fixture = Fixture::new(
            &[(S, 0, 100), (I, 0, 100), (I, 10, 90), (I, 20, 80)],
            vec![],
        );
        let out = compute_visit_output(&model, &fixture.columns());
        for &p in &out.inf_prob {
            assert!((0.0..=1.0).contains(&p));
        }
        for &c in &out.n_contacts {
            assert!(c >= 0);
        }
    }
}
