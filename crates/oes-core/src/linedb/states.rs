use super::store::LineRecord;
use crate::domain::WavelengthMedium;
use std::collections::HashMap;

/// Options for [`super::LineDatabase::lines_by_state`].
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct StateGrouping {
    /// Groups with fewer lines are dropped.
    pub min_lines: usize,
    pub medium: WavelengthMedium,
    pub max_j: Option<f64>,
    pub max_v: Option<i64>,
    /// Merge fine-structure components sharing `(v, J)`.
    pub singlet_like: bool,
}

impl Default for StateGrouping {
    fn default() -> Self {
        Self {
            min_lines: 1,
            medium: WavelengthMedium::default(),
            max_j: None,
            max_v: None,
            singlet_like: false,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct StateDescriptor {
    /// Upper-state id; `None` for merged singlet-like groups.
    pub upper_state: Option<i64>,
    pub j: f64,
    pub e_j: f64,
    pub e_v: f64,
    pub v: i64,
    pub component: Option<i64>,
    pub line_count: usize,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct StateLine {
    pub wavelength: f64,
    pub a: f64,
}

#[derive(Debug, Clone, PartialEq)]
pub struct StateLines {
    pub state: StateDescriptor,
    pub lines: Vec<StateLine>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
enum GroupKey {
    State(i64),
    VibRot { v: i64, j_bits: u64 },
}

struct Group<'a> {
    records: Vec<&'a LineRecord>,
}

pub(super) fn group_lines(lines: &[LineRecord], grouping: &StateGrouping) -> Vec<StateLines> {
    let mut index: HashMap<GroupKey, usize> = HashMap::new();
    let mut groups: Vec<Group<'_>> = Vec::new();

    for record in lines.iter().filter(|record| passes_filters(record, grouping)) {
        let key = if grouping.singlet_like {
            GroupKey::VibRot {
                v: record.state.v,
                j_bits: record.state.j.to_bits(),
            }
        } else {
            GroupKey::State(record.state.id)
        };
        let slot = *index.entry(key).or_insert_with(|| {
            groups.push(Group {
                records: Vec::new(),
            });
            groups.len() - 1
        });
        groups[slot].records.push(record);
    }

    let mut grouped: Vec<StateLines> = groups
        .into_iter()
        .filter(|group| group.records.len() >= grouping.min_lines)
        .map(|group| describe(&group, grouping))
        .collect();

    grouped.sort_by(|lhs, rhs| {
        if grouping.singlet_like {
            lhs.state
                .v
                .cmp(&rhs.state.v)
                .then_with(|| lhs.state.j.total_cmp(&rhs.state.j))
        } else {
            lhs.state.upper_state.cmp(&rhs.state.upper_state)
        }
    });
    grouped
}

fn passes_filters(record: &LineRecord, grouping: &StateGrouping) -> bool {
    grouping.max_j.is_none_or(|max_j| record.state.j <= max_j)
        && grouping.max_v.is_none_or(|max_v| record.state.v <= max_v)
}

fn describe(group: &Group<'_>, grouping: &StateGrouping) -> StateLines {
    let lines: Vec<StateLine> = group
        .records
        .iter()
        .map(|record| StateLine {
            wavelength: record.wavelength(grouping.medium),
            a: record.transition.a,
        })
        .collect();

    let first = &group.records[0].state;
    let state = if grouping.singlet_like {
        // distinct components of one (v, J) are averaged
        let mut seen = Vec::new();
        for record in &group.records {
            let energies = (record.state.e_j, record.state.e_v);
            if !seen.contains(&energies) {
                seen.push(energies);
            }
        }
        let count = seen.len() as f64;
        StateDescriptor {
            upper_state: None,
            j: first.j,
            e_j: seen.iter().map(|(e_j, _)| e_j).sum::<f64>() / count,
            e_v: seen.iter().map(|(_, e_v)| e_v).sum::<f64>() / count,
            v: first.v,
            component: None,
            line_count: lines.len(),
        }
    } else {
        StateDescriptor {
            upper_state: Some(first.id),
            j: first.j,
            e_j: first.e_j,
            e_v: first.e_v,
            v: first.v,
            component: Some(first.component),
            line_count: lines.len(),
        }
    };

    StateLines { state, lines }
}
