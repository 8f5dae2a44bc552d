//! Replication lag per member, relative to the primary's optime.

use std::collections::BTreeMap;

use tracing::debug;

use crate::doc::{Member, SampleDoc, STATE_ARBITER, STATE_PRIMARY, STATE_SECONDARY};
use crate::series::{with_keys, TimeSeries};

use super::{SeriesSet, REPLICATION_LAGS};

/// `host` (before the first dot) plus `:port`; the whole name otherwise.
pub fn member_legend(name: &str) -> String {
    match (name.find('.'), name.rfind(':')) {
        (Some(dot), Some(colon)) if dot < colon => format!("{}{}", &name[..dot], &name[colon..]),
        _ => name.to_string(),
    }
}

pub(super) fn derive(samples: &[SampleDoc]) -> SeriesSet {
    let mut set = SeriesSet {
        series: with_keys(&[REPLICATION_LAGS]),
        ..SeriesSet::default()
    };
    // member name -> series key, assigned on first sighting and never reused
    let mut keys: BTreeMap<String, String> = BTreeMap::new();

    for rs in samples.iter().filter_map(|s| s.repl_set.as_ref()) {
        let mut members: Vec<&Member> = rs.members.iter().collect();
        members.sort_by(|a, b| a.name.cmp(&b.name));

        for m in members.iter().filter(|m| m.state != STATE_ARBITER) {
            if keys.contains_key(&m.name) {
                continue;
            }
            let key = format!("repl_{}", keys.len());
            let legend = member_legend(&m.name);
            debug!("{key} {legend}");
            set.series.insert(key.clone(), TimeSeries::new(key.clone()));
            set.legends.insert(key.clone(), legend);
            keys.insert(m.name.clone(), key);
        }

        let reference = members
            .iter()
            .find(|m| m.state == STATE_PRIMARY)
            .map(|m| m.optime)
            .unwrap_or(0);
        if reference == 0 {
            continue;
        }
        for m in &members {
            let lag = match m.state {
                STATE_ARBITER => continue,
                STATE_SECONDARY => (reference - m.optime) as f64,
                _ => 0.0,
            };
            if let Some(s) = keys.get(&m.name).and_then(|k| set.series.get_mut(k)) {
                s.push(lag, rs.date);
            }
        }
    }
    set
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::doc::ReplSetStatus;
    use crate::series::DataPoint;

    fn member(name: &str, state: i32, optime: i64) -> Member {
        Member {
            name: name.to_string(),
            state,
            optime,
        }
    }

    fn sample(date: i64, members: Vec<Member>) -> SampleDoc {
        SampleDoc {
            start: date,
            end: date,
            repl_set: Some(ReplSetStatus { date, members }),
            ..SampleDoc::default()
        }
    }

    fn values(set: &SeriesSet, legend: &str) -> Vec<f64> {
        let key = set
            .legends
            .iter()
            .find(|(_, l)| l.as_str() == legend)
            .map(|(k, _)| k.clone())
            .unwrap();
        set.series[&key].datapoints.iter().map(DataPoint::value).collect()
    }

    #[test]
    fn legends_keep_host_and_port() {
        assert_eq!(member_legend("db1.example.com:27017"), "db1:27017");
        assert_eq!(member_legend("localhost:27017"), "localhost:27017");
        assert_eq!(member_legend("10.0.0.1"), "10.0.0.1");
    }

    #[test]
    fn lag_is_measured_from_the_primary() {
        let set = derive(&[sample(
            1_000,
            vec![
                member("a.x:1", STATE_PRIMARY, 100),
                member("b.x:1", STATE_SECONDARY, 90),
                member("c.x:1", STATE_SECONDARY, 70),
                member("d.x:1", STATE_ARBITER, 0),
            ],
        )]);
        assert_eq!(values(&set, "a:1"), vec![0.0]);
        assert_eq!(values(&set, "b:1"), vec![10.0]);
        assert_eq!(values(&set, "c:1"), vec![30.0]);
        assert!(!set.legends.values().any(|l| l == "d:1"));
        assert_eq!(set.legends.len(), 3);
    }

    #[test]
    fn samples_without_primary_are_skipped() {
        let set = derive(&[
            sample(1_000, vec![member("a:1", STATE_SECONDARY, 50), member("b:1", 3, 40)]),
            sample(2_000, vec![member("a:1", STATE_PRIMARY, 0), member("b:1", STATE_SECONDARY, 0)]),
        ]);
        assert!(set.series["repl_0"].is_empty());
        assert!(set.series["repl_1"].is_empty());
    }

    #[test]
    fn topology_change_keeps_existing_keys() {
        let set = derive(&[
            sample(
                1_000,
                vec![
                    member("b:1", STATE_SECONDARY, 95),
                    member("a:1", STATE_PRIMARY, 100),
                ],
            ),
            sample(
                2_000,
                vec![
                    member("a:1", STATE_PRIMARY, 110),
                    member("b:1", STATE_SECONDARY, 108),
                    member("c:1", 5, 0),
                ],
            ),
        ]);
        assert_eq!(set.legends["repl_0"], "a:1");
        assert_eq!(set.legends["repl_1"], "b:1");
        assert_eq!(set.legends["repl_2"], "c:1");
        assert_eq!(values(&set, "b:1"), vec![5.0, 2.0]);
        // other states record zero lag
        assert_eq!(set.series["repl_2"].datapoints, vec![DataPoint(0.0, 2_000)]);
    }
}
