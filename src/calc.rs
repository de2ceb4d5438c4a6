use chrono::NaiveDate;
use serde::Serialize;
use std::collections::{BTreeMap, HashMap};

use crate::model::{
    ExamPeriod, GradingConfig, InstrumentSource, ManualGrades, PeriodConfig, PracticeGroup,
    Service, ServiceEvaluation, ServiceGradeWeights, Snapshot,
};

#[derive(Debug, Clone, Serialize)]
pub struct CalcError {
    pub code: String,
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub details: Option<serde_json::Value>,
}

impl CalcError {
    pub fn new(code: &str, message: impl Into<String>) -> Self {
        Self {
            code: code.to_string(),
            message: message.into(),
            details: None,
        }
    }
}

/// 2-decimal rounding matching the UI's `toFixed(2)` (half away from zero).
pub fn round2(x: f64) -> f64 {
    (x * 100.0).round() / 100.0
}

/// Calendar-day parser. ISO first, legacy `DD/MM/YYYY` second.
/// Day precision only, so there is no timezone off-by-one to normalize away.
pub fn parse_day(raw: &str) -> Option<NaiveDate> {
    let trimmed = raw.trim();
    NaiveDate::parse_from_str(trimmed, "%Y-%m-%d")
        .or_else(|_| NaiveDate::parse_from_str(trimmed, "%d/%m/%Y"))
        .ok()
}

/// Maps a calendar date into a grading period. Fails closed: a malformed
/// date, or one covered by no configured range, classifies as `None` and the
/// record is excluded from aggregation rather than defaulted.
pub fn classify_period<'a>(date: &str, periods: &'a [PeriodConfig]) -> Option<&'a str> {
    let day = parse_day(date)?;
    periods.iter().find_map(|p| {
        let start = parse_day(&p.start)?;
        let end = parse_day(&p.end)?;
        (start <= day && day <= end).then_some(p.key.as_str())
    })
}

/// Independent per-period score lists. Individual and group scalars are not
/// paired: a student may contribute either, both, or neither for one service.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct ScoreBucket {
    pub individual: Vec<f64>,
    pub group: Vec<f64>,
}

pub type PeriodBuckets = BTreeMap<String, ScoreBucket>;

fn sum_present(scores: &[Option<f64>]) -> Option<f64> {
    let present: Vec<f64> = scores.iter().flatten().copied().collect();
    if present.is_empty() {
        None
    } else {
        Some(present.iter().sum())
    }
}

fn mean(values: &[f64]) -> Option<f64> {
    if values.is_empty() {
        None
    } else {
        Some(values.iter().sum::<f64>() / values.len() as f64)
    }
}

/// Folds every service evaluation into per-period individual/group score
/// lists for one student.
///
/// An individual scalar requires `attendance` plus at least one non-null
/// entry; a group scalar only requires the student's (first) practice group
/// to have a score vector with a non-null entry for this service. Services
/// whose date classifies into no period are skipped entirely.
pub fn aggregate_service_scores(
    student_id: &str,
    services: &[Service],
    evaluations: &[ServiceEvaluation],
    groups: &[PracticeGroup],
    periods: &[PeriodConfig],
) -> PeriodBuckets {
    let service_dates: HashMap<&str, &str> = services
        .iter()
        .map(|s| (s.id.as_str(), s.date.as_str()))
        .collect();
    let student_group = groups
        .iter()
        .find(|g| g.student_ids.iter().any(|id| id == student_id));

    let mut buckets = PeriodBuckets::new();
    for evaluation in evaluations {
        let Some(date) = service_dates.get(evaluation.service_id.as_str()) else {
            continue;
        };
        let Some(period_key) = classify_period(date, periods) else {
            continue;
        };

        let individual = evaluation
            .service_day
            .individual_scores
            .get(student_id)
            .filter(|ind| ind.attendance)
            .and_then(|ind| sum_present(&ind.scores));

        let group = student_group
            .and_then(|g| evaluation.service_day.group_scores.get(&g.id))
            .and_then(|grp| sum_present(&grp.scores));

        if individual.is_none() && group.is_none() {
            continue;
        }
        let bucket = buckets.entry(period_key.to_string()).or_default();
        if let Some(v) = individual {
            bucket.individual.push(v);
        }
        if let Some(v) = group {
            bucket.group.push(v);
        }
    }
    buckets
}

/// Weighted service grade for one period bucket: both means when both lists
/// are populated, the single present mean otherwise, `None` for an empty
/// bucket. The missing side never counts as zero.
pub fn service_grade(bucket: &ScoreBucket, weights: ServiceGradeWeights) -> Option<f64> {
    match (mean(&bucket.individual), mean(&bucket.group)) {
        (Some(i), Some(g)) => Some(i * weights.individual + g * weights.group),
        (Some(i), None) => Some(i),
        (None, Some(g)) => Some(g),
        (None, None) => None,
    }
}

/// Resolved grade inputs for one period, threaded in explicitly so the
/// averager stays a pure function of its arguments.
#[derive(Debug, Clone, Copy, Default)]
pub struct PeriodGradeSource<'a> {
    pub manual: Option<&'a ManualGrades>,
    pub service_average: Option<f64>,
    pub exam_scores: &'a [(ExamPeriod, f64)],
}

fn parse_manual_grade(value: &serde_json::Value) -> Option<f64> {
    match value {
        serde_json::Value::Number(n) => n.as_f64(),
        serde_json::Value::String(s) => s.trim().parse::<f64>().ok(),
        _ => None,
    }
}

/// Weighted period average with renormalization: only instruments that
/// actually produced a grade contribute, and the denominator is the sum of
/// their weights. A period missing one ungraded instrument therefore never
/// counts it as zero.
pub fn period_average(period: &PeriodConfig, source: PeriodGradeSource<'_>) -> Option<f64> {
    let mut weighted_sum = 0.0;
    let mut weight_total = 0.0;

    for instrument in &period.instruments {
        let grade = match instrument.source {
            InstrumentSource::Manual => source
                .manual
                .and_then(|m| m.get(&instrument.key))
                .and_then(parse_manual_grade),
            InstrumentSource::ServiceAverage => source.service_average,
            InstrumentSource::PracticalExam { period: exam } => source
                .exam_scores
                .iter()
                .find(|(p, _)| *p == exam)
                .map(|(_, score)| *score),
        };
        if let Some(grade) = grade.filter(|g| g.is_finite()) {
            weighted_sum += grade * instrument.weight;
            weight_total += instrument.weight;
        }
    }

    if weight_total > 0.0 {
        Some(round2(weighted_sum / weight_total))
    } else {
        None
    }
}

// --- Derived per-student grades -------------------------------------------

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PracticalExamScores {
    pub t1: Option<f64>,
    pub t2: Option<f64>,
    pub rec: Option<f64>,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct StudentCalculatedGrades {
    pub student_id: String,
    pub display_name: String,
    /// periodKey -> weighted service grade for that period.
    pub service_averages: BTreeMap<String, Option<f64>>,
    /// Overall service grade across every classified service.
    pub service_average: Option<f64>,
    pub practical_exams: PracticalExamScores,
    /// periodKey -> renormalized weighted instrument average.
    pub period_averages: BTreeMap<String, Option<f64>>,
}

fn exam_final(snapshot: &Snapshot, student_id: &str, period: ExamPeriod) -> Option<f64> {
    snapshot
        .practical_exam_evaluations
        .iter()
        .find(|e| e.student_id == student_id && e.exam_period == period)
        .and_then(|e| e.final_score)
}

/// Never persisted; always recomputed from the snapshot, so repeated calls
/// over the same snapshot are bit-identical.
pub fn compute_student_grades(
    snapshot: &Snapshot,
    config: &GradingConfig,
    student_id: &str,
) -> Result<StudentCalculatedGrades, CalcError> {
    let student = snapshot
        .student(student_id)
        .ok_or_else(|| CalcError::new("not_found", "student not found"))?;

    let buckets = aggregate_service_scores(
        student_id,
        &snapshot.services,
        &snapshot.service_evaluations,
        &snapshot.practice_groups,
        &config.periods,
    );

    let mut service_averages = BTreeMap::new();
    let mut all = ScoreBucket::default();
    for period in &config.periods {
        let grade = buckets
            .get(&period.key)
            .and_then(|b| service_grade(b, config.service_grade_weights))
            .map(round2);
        service_averages.insert(period.key.clone(), grade);
    }
    for bucket in buckets.values() {
        all.individual.extend_from_slice(&bucket.individual);
        all.group.extend_from_slice(&bucket.group);
    }
    let overall = service_grade(&all, config.service_grade_weights).map(round2);

    let exams = PracticalExamScores {
        t1: exam_final(snapshot, student_id, ExamPeriod::T1),
        t2: exam_final(snapshot, student_id, ExamPeriod::T2),
        rec: exam_final(snapshot, student_id, ExamPeriod::Rec),
    };
    let exam_scores: Vec<(ExamPeriod, f64)> = [
        (ExamPeriod::T1, exams.t1),
        (ExamPeriod::T2, exams.t2),
        (ExamPeriod::Rec, exams.rec),
    ]
    .into_iter()
    .filter_map(|(p, s)| s.map(|s| (p, s)))
    .collect();

    let manual_by_period = snapshot.academic_grades.get(student_id);
    let mut period_averages = BTreeMap::new();
    for period in &config.periods {
        let source = PeriodGradeSource {
            manual: manual_by_period.and_then(|m| m.get(&period.key)),
            service_average: service_averages.get(&period.key).copied().flatten(),
            exam_scores: &exam_scores,
        };
        period_averages.insert(period.key.clone(), period_average(period, source));
    }

    Ok(StudentCalculatedGrades {
        student_id: student.id.clone(),
        display_name: student.display_name(),
        service_averages,
        service_average: overall,
        practical_exams: exams,
        period_averages,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::Instrument;
    use serde_json::json;
    use std::collections::HashMap;

    fn periods() -> Vec<PeriodConfig> {
        [
            ("t1", "2025-09-08", "2025-12-22"),
            ("t2", "2026-01-08", "2026-03-27"),
            ("t3", "2026-04-07", "2026-06-19"),
        ]
        .into_iter()
        .map(|(key, start, end)| PeriodConfig {
            key: key.to_string(),
            name: key.to_uppercase(),
            start: start.to_string(),
            end: end.to_string(),
            instruments: Vec::new(),
        })
        .collect()
    }

    fn service(id: &str, date: &str) -> Service {
        serde_json::from_value(json!({ "id": id, "name": id, "date": date }))
            .expect("service from json")
    }

    fn evaluation(service_id: &str, body: serde_json::Value) -> ServiceEvaluation {
        serde_json::from_value(json!({
            "id": format!("ev-{service_id}"),
            "serviceId": service_id,
            "serviceDay": body
        }))
        .expect("evaluation from json")
    }

    fn one_group() -> Vec<PracticeGroup> {
        vec![PracticeGroup {
            id: "g1".into(),
            name: "Grupo 1".into(),
            student_ids: vec!["s1".into()],
        }]
    }

    #[test]
    fn classify_is_inclusive_and_fails_closed() {
        let periods = periods();
        assert_eq!(classify_period("2025-09-08", &periods), Some("t1"));
        assert_eq!(classify_period("2025-12-22", &periods), Some("t1"));
        assert_eq!(classify_period("2026-02-14", &periods), Some("t2"));
        // Gap between configured ranges, pre-start, and garbage all exclude.
        assert_eq!(classify_period("2026-01-02", &periods), None);
        assert_eq!(classify_period("2025-08-01", &periods), None);
        assert_eq!(classify_period("not-a-date", &periods), None);
    }

    #[test]
    fn unclassified_service_contributes_to_no_bucket() {
        let services = vec![service("srv1", "2025-08-01")];
        let evaluations = vec![evaluation(
            "srv1",
            json!({
                "individualScores": {
                    "s1": { "attendance": true, "scores": [5.0], "observations": "" }
                }
            }),
        )];
        let buckets =
            aggregate_service_scores("s1", &services, &evaluations, &one_group(), &periods());
        assert!(buckets.is_empty());
    }

    #[test]
    fn individual_requires_attendance_and_a_score() {
        let services = vec![service("srv1", "2025-10-15"), service("srv2", "2025-10-22")];
        let evaluations = vec![
            evaluation(
                "srv1",
                json!({
                    "individualScores": {
                        "s1": { "attendance": false, "scores": [5.0], "observations": "" }
                    }
                }),
            ),
            evaluation(
                "srv2",
                json!({
                    "individualScores": {
                        "s1": { "attendance": true, "scores": [null, null], "observations": "" }
                    }
                }),
            ),
        ];
        let buckets =
            aggregate_service_scores("s1", &services, &evaluations, &one_group(), &periods());
        assert!(buckets.is_empty());
    }

    #[test]
    fn group_scalar_is_collected_without_individual_attendance() {
        let services = vec![service("srv1", "2025-10-15")];
        let evaluations = vec![evaluation(
            "srv1",
            json!({
                "individualScores": {
                    "s1": { "attendance": false, "scores": [5.0], "observations": "" }
                },
                "groupScores": {
                    "g1": { "scores": [2.0, null, 4.0], "observations": "" }
                }
            }),
        )];
        let buckets =
            aggregate_service_scores("s1", &services, &evaluations, &one_group(), &periods());
        let bucket = buckets.get("t1").expect("t1 bucket");
        assert!(bucket.individual.is_empty());
        assert_eq!(bucket.group, vec![6.0]);
    }

    #[test]
    fn weighted_service_grade_scenario() {
        let bucket = ScoreBucket {
            individual: vec![7.5],
            group: vec![6.0],
        };
        let weights = ServiceGradeWeights {
            individual: 0.6,
            group: 0.4,
        };
        let grade = service_grade(&bucket, weights).expect("grade");
        assert!((grade - 6.9).abs() < 1e-9);
    }

    #[test]
    fn single_sided_bucket_uses_the_present_mean() {
        let weights = ServiceGradeWeights::default();
        let ind_only = ScoreBucket {
            individual: vec![8.0, 6.0],
            group: vec![],
        };
        assert_eq!(service_grade(&ind_only, weights), Some(7.0));
        let grp_only = ScoreBucket {
            individual: vec![],
            group: vec![5.5],
        };
        assert_eq!(service_grade(&grp_only, weights), Some(5.5));
        assert_eq!(service_grade(&ScoreBucket::default(), weights), None);
    }

    fn instrumented_period(instruments: Vec<Instrument>) -> PeriodConfig {
        PeriodConfig {
            key: "t1".into(),
            name: "1ª Evaluación".into(),
            start: "2025-09-08".into(),
            end: "2025-12-22".into(),
            instruments,
        }
    }

    fn manual_instrument(key: &str, weight: f64) -> Instrument {
        Instrument {
            key: key.into(),
            name: key.into(),
            weight,
            source: InstrumentSource::Manual,
        }
    }

    #[test]
    fn partial_period_renormalizes_instead_of_zeroing() {
        let period = instrumented_period(vec![
            manual_instrument("a", 0.5),
            manual_instrument("b", 0.5),
        ]);
        let manual: ManualGrades = HashMap::from([("a".to_string(), json!(8.0))]);
        let avg = period_average(
            &period,
            PeriodGradeSource {
                manual: Some(&manual),
                ..PeriodGradeSource::default()
            },
        );
        assert_eq!(avg, Some(8.0));
    }

    #[test]
    fn all_instruments_missing_yields_none() {
        let period = instrumented_period(vec![
            manual_instrument("a", 0.5),
            Instrument {
                key: "servicios".into(),
                name: "Servicios".into(),
                weight: 0.5,
                source: InstrumentSource::ServiceAverage,
            },
        ]);
        let avg = period_average(&period, PeriodGradeSource::default());
        assert_eq!(avg, None);
    }

    #[test]
    fn manual_grades_parse_numbers_and_numeric_strings() {
        let period = instrumented_period(vec![
            manual_instrument("a", 0.3),
            manual_instrument("b", 0.7),
        ]);
        let manual: ManualGrades = HashMap::from([
            ("a".to_string(), json!("6.5 ")),
            ("b".to_string(), json!("apto")),
        ]);
        let avg = period_average(
            &period,
            PeriodGradeSource {
                manual: Some(&manual),
                ..PeriodGradeSource::default()
            },
        );
        // The non-numeric entry is absent; the single graded instrument's
        // weight cancels out.
        assert_eq!(avg, Some(6.5));
    }

    #[test]
    fn exam_instrument_resolves_by_tagged_period() {
        let period = instrumented_period(vec![Instrument {
            key: "exPracticoT1".into(),
            name: "Ex. Práctico T1".into(),
            weight: 0.4,
            source: InstrumentSource::PracticalExam {
                period: ExamPeriod::T1,
            },
        }]);
        let exams = [(ExamPeriod::T1, 7.25), (ExamPeriod::T2, 3.0)];
        let avg = period_average(
            &period,
            PeriodGradeSource {
                exam_scores: &exams,
                ..PeriodGradeSource::default()
            },
        );
        assert_eq!(avg, Some(7.25));
    }

    fn scenario_snapshot() -> Snapshot {
        serde_json::from_value(json!({
            "students": [
                { "id": "s1", "apellido1": "García", "nombre": "Ana" },
                { "id": "s2", "apellido1": "Ruiz", "nombre": "Luis" }
            ],
            "practiceGroups": [
                { "id": "g1", "name": "Grupo 1", "studentIds": ["s1", "s2"] }
            ],
            "services": [
                { "id": "srv1", "name": "Servicio 1", "date": "2025-10-15" }
            ],
            "serviceEvaluations": [{
                "id": "ev1",
                "serviceId": "srv1",
                "serviceDay": {
                    "individualScores": {
                        "s1": { "attendance": true, "scores": [4.0, 3.5], "observations": "" }
                    },
                    "groupScores": {
                        "g1": { "scores": [6.0], "observations": "" }
                    }
                }
            }],
            "config": {
                "periods": [
                    { "key": "t1", "name": "T1", "start": "2025-09-08", "end": "2025-12-22" },
                    { "key": "t2", "name": "T2", "start": "2026-01-08", "end": "2026-03-27" }
                ]
            }
        }))
        .expect("snapshot from json")
    }

    #[test]
    fn zero_qualifying_period_is_none_not_zero() {
        let snapshot = scenario_snapshot();
        let grades = compute_student_grades(&snapshot, &snapshot.config, "s1").expect("grades");
        assert_eq!(grades.service_averages.get("t2"), Some(&None));
        // 7.5*0.6 + 6.0*0.4 = 6.9 in the populated period.
        assert_eq!(grades.service_averages.get("t1"), Some(&Some(6.9)));
    }

    #[test]
    fn student_without_individual_score_still_gets_group_grade() {
        let snapshot = scenario_snapshot();
        let grades = compute_student_grades(&snapshot, &snapshot.config, "s2").expect("grades");
        assert_eq!(grades.service_averages.get("t1"), Some(&Some(6.0)));
    }

    #[test]
    fn recomputation_is_idempotent() {
        let snapshot = scenario_snapshot();
        let a = compute_student_grades(&snapshot, &snapshot.config, "s1").expect("first");
        let b = compute_student_grades(&snapshot, &snapshot.config, "s1").expect("second");
        assert_eq!(
            serde_json::to_string(&a).expect("serialize a"),
            serde_json::to_string(&b).expect("serialize b")
        );
    }

    #[test]
    fn missing_student_is_a_calc_error() {
        let snapshot = scenario_snapshot();
        let err = compute_student_grades(&snapshot, &snapshot.config, "nobody")
            .expect_err("unknown student");
        assert_eq!(err.code, "not_found");
    }
}
