use serde::{Deserialize, Serialize};
use std::collections::{HashMap, HashSet};

#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Student {
    pub id: String,
    #[serde(default)]
    pub nre: String,
    #[serde(default)]
    pub expediente: String,
    pub apellido1: String,
    #[serde(default)]
    pub apellido2: String,
    pub nombre: String,
    #[serde(default)]
    pub grupo: String,
    #[serde(default)]
    pub subgrupo: String,
    #[serde(default)]
    pub fecha_nacimiento: String,
    #[serde(default)]
    pub telefono: String,
    #[serde(default)]
    pub email_personal: String,
    #[serde(default)]
    pub email_oficial: String,
}

impl Student {
    /// "Apellido1 Apellido2, Nombre" as the UI prints it.
    pub fn display_name(&self) -> String {
        let apellidos = format!("{} {}", self.apellido1, self.apellido2);
        format!("{}, {}", apellidos.trim(), self.nombre)
    }

    /// Compact "Apellido1 N." form used in wide table headers.
    pub fn short_name(&self) -> String {
        match self.nombre.chars().next() {
            Some(initial) => format!("{} {}.", self.apellido1, initial),
            None => self.apellido1.clone(),
        }
    }
}

#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PracticeGroup {
    pub id: String,
    pub name: String,
    #[serde(default)]
    pub student_ids: Vec<String>,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct StudentRoleAssignment {
    pub student_id: String,
    #[serde(default)]
    pub role_id: Option<String>,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Elaboration {
    pub id: String,
    pub name: String,
    #[serde(default)]
    pub responsible_group_id: Option<String>,
}

#[derive(Debug, Clone, Default, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AreaGroups {
    #[serde(default)]
    pub comedor: Vec<String>,
    #[serde(default)]
    pub takeaway: Vec<String>,
}

#[derive(Debug, Clone, Default, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AreaElaborations {
    #[serde(default)]
    pub comedor: Vec<Elaboration>,
    #[serde(default)]
    pub takeaway: Vec<Elaboration>,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Service {
    pub id: String,
    pub name: String,
    /// Calendar day, ISO `YYYY-MM-DD`.
    pub date: String,
    #[serde(default)]
    pub is_locked: bool,
    #[serde(default)]
    pub assigned_groups: AreaGroups,
    #[serde(default)]
    pub elaborations: AreaElaborations,
    #[serde(default)]
    pub student_roles: Vec<StudentRoleAssignment>,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PreServiceIndividualEvaluation {
    #[serde(default = "default_true")]
    pub attendance: bool,
    #[serde(default = "default_true")]
    pub has_fichas: bool,
    #[serde(default = "default_true")]
    pub has_uniforme: bool,
    #[serde(default = "default_true")]
    pub has_material: bool,
    /// Ordinal per behavior item: 2 = "++", 1 = "+", 0 = "-".
    #[serde(default)]
    pub behavior_scores: HashMap<String, Option<i64>>,
    #[serde(default)]
    pub observations: String,
}

fn default_true() -> bool {
    true
}

#[derive(Debug, Clone, Default, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PreServiceDayEvaluation {
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub group_observations: HashMap<String, String>,
    #[serde(default)]
    pub individual_evaluations: HashMap<String, PreServiceIndividualEvaluation>,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ServiceDayGroupScores {
    #[serde(default)]
    pub scores: Vec<Option<f64>>,
    #[serde(default)]
    pub observations: String,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ServiceDayIndividualScores {
    #[serde(default)]
    pub attendance: bool,
    #[serde(default)]
    pub scores: Vec<Option<f64>>,
    #[serde(default)]
    pub observations: String,
}

#[derive(Debug, Clone, Default, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ServiceDayEvaluation {
    #[serde(default)]
    pub group_scores: HashMap<String, ServiceDayGroupScores>,
    #[serde(default)]
    pub individual_scores: HashMap<String, ServiceDayIndividualScores>,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ServiceEvaluation {
    pub id: String,
    pub service_id: String,
    /// Keyed by calendar day; a service may have zero or more prep days.
    #[serde(default)]
    pub pre_service: HashMap<String, PreServiceDayEvaluation>,
    #[serde(default)]
    pub service_day: ServiceDayEvaluation,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Deserialize, Serialize)]
pub enum ExamPeriod {
    #[serde(rename = "t1")]
    T1,
    #[serde(rename = "t2")]
    T2,
    #[serde(rename = "rec")]
    Rec,
}

impl ExamPeriod {
    pub fn as_str(self) -> &'static str {
        match self {
            ExamPeriod::T1 => "t1",
            ExamPeriod::T2 => "t2",
            ExamPeriod::Rec => "rec",
        }
    }
}

#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PracticalExamEvaluation {
    pub id: String,
    pub student_id: String,
    pub exam_period: ExamPeriod,
    #[serde(default)]
    pub final_score: Option<f64>,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct EntryExitRecord {
    pub id: String,
    pub student_id: String,
    /// `DD/MM/YYYY` in legacy data, ISO accepted as well.
    pub date: String,
    #[serde(rename = "type")]
    pub kind: String,
    #[serde(default)]
    pub reason: String,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ServiceRole {
    pub id: String,
    pub name: String,
    #[serde(rename = "type", default)]
    pub kind: RoleKind,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub enum RoleKind {
    Leader,
    #[default]
    Secondary,
}

#[derive(Debug, Clone, Default, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TeacherData {
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub email: String,
    /// Base64 JPEG payload; anything else is skipped at draw time.
    #[serde(default)]
    pub logo: Option<String>,
}

#[derive(Debug, Clone, Default, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct InstituteData {
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub address: String,
    #[serde(default)]
    pub cif: String,
    #[serde(default)]
    pub logo: Option<String>,
}

// --- Grading configuration -------------------------------------------------

#[derive(Debug, Clone, Copy, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ServiceGradeWeights {
    pub individual: f64,
    pub group: f64,
}

impl Default for ServiceGradeWeights {
    fn default() -> Self {
        Self {
            individual: 0.6,
            group: 0.4,
        }
    }
}

/// Tagged grade source for a period instrument. Replaces the original's
/// string-keyed lookup table so a mistyped key cannot silently no-op.
#[derive(Debug, Clone, Copy, PartialEq, Deserialize, Serialize)]
#[serde(tag = "type", rename_all = "camelCase")]
pub enum InstrumentSource {
    Manual,
    ServiceAverage,
    PracticalExam { period: ExamPeriod },
}

#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Instrument {
    pub key: String,
    pub name: String,
    pub weight: f64,
    pub source: InstrumentSource,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PeriodConfig {
    pub key: String,
    pub name: String,
    /// Inclusive calendar-day range, ISO `YYYY-MM-DD`.
    pub start: String,
    pub end: String,
    #[serde(default)]
    pub instruments: Vec<Instrument>,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct BehaviorItem {
    pub id: String,
    pub label: String,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct GradingConfig {
    #[serde(default)]
    pub service_grade_weights: ServiceGradeWeights,
    #[serde(default)]
    pub periods: Vec<PeriodConfig>,
    /// Upper bound for any single service-day score entry.
    #[serde(default = "default_score_max")]
    pub service_score_max: f64,
    #[serde(default = "default_behavior_items")]
    pub behavior_items: Vec<BehaviorItem>,
    /// Labels for positional service-day score entries (individual vector).
    #[serde(default = "default_service_day_items")]
    pub service_day_items: Vec<String>,
    /// Labels for positional group score entries.
    #[serde(default = "default_group_day_items")]
    pub group_day_items: Vec<String>,
}

fn default_score_max() -> f64 {
    10.0
}

fn default_behavior_items() -> Vec<BehaviorItem> {
    [
        ("actitud", "Actitud e interés"),
        ("trabajoEquipo", "Trabajo en equipo"),
        ("organizacion", "Organización"),
        ("higiene", "Higiene y uniformidad"),
    ]
    .into_iter()
    .map(|(id, label)| BehaviorItem {
        id: id.to_string(),
        label: label.to_string(),
    })
    .collect()
}

fn default_service_day_items() -> Vec<String> {
    ["Mise en place", "Técnica", "Servicio", "Limpieza"]
        .into_iter()
        .map(str::to_string)
        .collect()
}

fn default_group_day_items() -> Vec<String> {
    ["Coordinación", "Ritmo de servicio", "Resultado final"]
        .into_iter()
        .map(str::to_string)
        .collect()
}

impl Default for GradingConfig {
    fn default() -> Self {
        Self {
            service_grade_weights: ServiceGradeWeights::default(),
            periods: Vec::new(),
            service_score_max: default_score_max(),
            behavior_items: default_behavior_items(),
            service_day_items: default_service_day_items(),
            group_day_items: default_group_day_items(),
        }
    }
}

// --- Snapshot --------------------------------------------------------------

/// Manual grade cell: number or numeric string; anything else is absent.
pub type ManualGrades = HashMap<String, serde_json::Value>;

/// Immutable snapshot pushed by the CRUD collaborator. The core never
/// mutates it; every derived result is a pure function of one snapshot.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Snapshot {
    #[serde(default)]
    pub students: Vec<Student>,
    #[serde(default)]
    pub practice_groups: Vec<PracticeGroup>,
    #[serde(default)]
    pub services: Vec<Service>,
    #[serde(default)]
    pub service_evaluations: Vec<ServiceEvaluation>,
    #[serde(default)]
    pub practical_exam_evaluations: Vec<PracticalExamEvaluation>,
    #[serde(default)]
    pub service_roles: Vec<ServiceRole>,
    #[serde(default)]
    pub entry_exit_records: Vec<EntryExitRecord>,
    #[serde(default)]
    pub teacher: TeacherData,
    #[serde(default)]
    pub institute: InstituteData,
    /// studentId -> periodKey -> instrumentKey -> grade value.
    #[serde(default)]
    pub academic_grades: HashMap<String, HashMap<String, ManualGrades>>,
    #[serde(default)]
    pub config: GradingConfig,
}

impl Snapshot {
    pub fn student(&self, id: &str) -> Option<&Student> {
        self.students.iter().find(|s| s.id == id)
    }

    pub fn service(&self, id: &str) -> Option<&Service> {
        self.services.iter().find(|s| s.id == id)
    }

    pub fn evaluation_for_service(&self, service_id: &str) -> Option<&ServiceEvaluation> {
        self.service_evaluations
            .iter()
            .find(|e| e.service_id == service_id)
    }

    pub fn group(&self, id: &str) -> Option<&PracticeGroup> {
        self.practice_groups.iter().find(|g| g.id == id)
    }

    /// First group containing the student, in snapshot order. Membership in
    /// more than one group is a validation issue, not silently resolved here.
    pub fn group_of_student(&self, student_id: &str) -> Option<&PracticeGroup> {
        self.practice_groups
            .iter()
            .find(|g| g.student_ids.iter().any(|id| id == student_id))
    }

    pub fn role(&self, id: &str) -> Option<&ServiceRole> {
        self.service_roles.iter().find(|r| r.id == id)
    }
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ValidationIssue {
    pub code: String,
    pub message: String,
}

impl ValidationIssue {
    fn new(code: &str, message: impl Into<String>) -> Self {
        Self {
            code: code.to_string(),
            message: message.into(),
        }
    }
}

/// Non-fatal checks over a freshly loaded snapshot. The upstream CRUD layer
/// owns entity validity; these only flag the conditions that would make the
/// derived grades ambiguous.
pub fn validate_snapshot(snapshot: &Snapshot) -> Vec<ValidationIssue> {
    let mut issues = Vec::new();

    let mut seen: HashMap<&str, &str> = HashMap::new();
    for group in &snapshot.practice_groups {
        for student_id in &group.student_ids {
            if let Some(first) = seen.get(student_id.as_str()) {
                issues.push(ValidationIssue::new(
                    "duplicate_group_membership",
                    format!(
                        "student {} belongs to groups {} and {}; aggregation uses the first",
                        student_id, first, group.id
                    ),
                ));
            } else {
                seen.insert(student_id, &group.id);
            }
        }
    }

    let known: HashSet<&str> = snapshot.students.iter().map(|s| s.id.as_str()).collect();
    for group in &snapshot.practice_groups {
        for student_id in &group.student_ids {
            if !known.contains(student_id.as_str()) {
                issues.push(ValidationIssue::new(
                    "unknown_student_in_group",
                    format!("group {} references unknown student {}", group.id, student_id),
                ));
            }
        }
    }

    let max = snapshot.config.service_score_max;
    for evaluation in &snapshot.service_evaluations {
        let out_of_range = |scores: &[Option<f64>]| {
            scores
                .iter()
                .flatten()
                .any(|s| *s < 0.0 || *s > max)
        };
        for (student_id, ind) in &evaluation.service_day.individual_scores {
            if out_of_range(&ind.scores) {
                issues.push(ValidationIssue::new(
                    "score_out_of_range",
                    format!(
                        "evaluation {}: individual score for {} outside [0, {}]",
                        evaluation.id, student_id, max
                    ),
                ));
            }
        }
        for (group_id, grp) in &evaluation.service_day.group_scores {
            if out_of_range(&grp.scores) {
                issues.push(ValidationIssue::new(
                    "score_out_of_range",
                    format!(
                        "evaluation {}: group score for {} outside [0, {}]",
                        evaluation.id, group_id, max
                    ),
                ));
            }
        }
    }

    issues
}
