//! Report view model and document composers.
//!
//! Every composer is a pure transform from an immutable snapshot to finished
//! PDF bytes. The "generated on" stamp is an explicit parameter; nothing in
//! here reads the clock or any other ambient state.

use base64::Engine as _;
use chrono::{Datelike, Duration, NaiveDate};
use std::collections::HashSet;

use crate::calc::{self, parse_day, CalcError};
use crate::layout::{
    draw_table, Align, Color, Column, LayoutEngine, PageChrome, PageMetrics, Surface, TableStyle,
    TextStyle,
};
use crate::model::{
    Elaboration, EntryExitRecord, PracticeGroup, PreServiceDayEvaluation, RoleKind, Service,
    ServiceEvaluation, Snapshot, Student,
};
use crate::pdf::PdfSurface;

const PAGE_MARGIN: f64 = 15.0;

const HEAD_BLUE: Color = Color::Rgb(41, 128, 185);
const HEAD_GREEN: Color = Color::Rgb(34, 139, 34);
const HEAD_ORANGE: Color = Color::Rgb(255, 165, 0);
const HEAD_SLATE: Color = Color::Rgb(52, 73, 94);

#[derive(Debug)]
pub struct ComposedDocument {
    pub file_name: String,
    pub pages: u32,
    pub bytes: Vec<u8>,
}

// --- View model ------------------------------------------------------------

#[derive(Debug)]
pub struct GroupSection<'a> {
    pub group: &'a PracticeGroup,
    pub students: Vec<&'a Student>,
}

/// Denormalized, read-only join consumed by the composers. Groups keep
/// snapshot order; members are sorted by surname then given name.
#[derive(Debug)]
pub struct ReportViewModel<'a> {
    pub service: &'a Service,
    pub evaluation: &'a ServiceEvaluation,
    pub grouped_students: Vec<GroupSection<'a>>,
    pub participating_students: Vec<&'a Student>,
}

pub fn build_view_model<'a>(
    snapshot: &'a Snapshot,
    service_id: &str,
) -> Result<ReportViewModel<'a>, CalcError> {
    let service = snapshot
        .service(service_id)
        .ok_or_else(|| CalcError::new("not_found", "service not found"))?;
    let evaluation = snapshot
        .evaluation_for_service(service_id)
        .ok_or_else(|| CalcError::new("not_found", "service evaluation not found"))?;

    let participating_ids: HashSet<&str> = service
        .assigned_groups
        .comedor
        .iter()
        .chain(&service.assigned_groups.takeaway)
        .map(String::as_str)
        .collect();

    let grouped_students: Vec<GroupSection<'a>> = snapshot
        .practice_groups
        .iter()
        .filter(|g| participating_ids.contains(g.id.as_str()))
        .map(|group| {
            let mut students: Vec<&Student> = snapshot
                .students
                .iter()
                .filter(|s| group.student_ids.iter().any(|id| *id == s.id))
                .collect();
            students.sort_by(|a, b| {
                (&a.apellido1, &a.nombre).cmp(&(&b.apellido1, &b.nombre))
            });
            GroupSection { group, students }
        })
        .collect();

    let mut participating_students: Vec<&Student> = grouped_students
        .iter()
        .flat_map(|g| g.students.iter().copied())
        .collect();
    participating_students
        .sort_by(|a, b| (&a.apellido1, &a.nombre).cmp(&(&b.apellido1, &b.nombre)));

    Ok(ReportViewModel {
        service,
        evaluation,
        grouped_students,
        participating_students,
    })
}

/// Most recent pre-service day. Unparsable keys sort last.
fn latest_pre_service_day(
    evaluation: &ServiceEvaluation,
) -> Option<(&str, &PreServiceDayEvaluation)> {
    evaluation
        .pre_service
        .iter()
        .max_by(|(a, _), (b, _)| (parse_day(a), a.as_str()).cmp(&(parse_day(b), b.as_str())))
        .map(|(key, day)| (key.as_str(), day))
}

/// Monday through Sunday of the calendar week containing `day`, independent
/// of the locale's week-start convention.
pub fn week_window(day: NaiveDate) -> (NaiveDate, NaiveDate) {
    let monday = day - Duration::days(day.weekday().num_days_from_monday() as i64);
    (monday, monday + Duration::days(6))
}

fn student_incidents_in_week<'a>(
    snapshot: &'a Snapshot,
    student_id: &str,
    service_date: NaiveDate,
) -> Vec<&'a EntryExitRecord> {
    let (monday, sunday) = week_window(service_date);
    let mut records: Vec<&EntryExitRecord> = snapshot
        .entry_exit_records
        .iter()
        .filter(|r| r.student_id == student_id)
        .filter(|r| {
            parse_day(&r.date)
                .map(|d| monday <= d && d <= sunday)
                .unwrap_or(false)
        })
        .collect();
    records.sort_by_key(|r| parse_day(&r.date));
    records
}

// --- Page chrome -----------------------------------------------------------

fn decode_logo(src: Option<&str>) -> Option<Vec<u8>> {
    let raw = src?;
    // Data-URL payloads may still carry their prefix.
    let payload = raw.split_once(',').map(|(_, p)| p).unwrap_or(raw);
    base64::engine::general_purpose::STANDARD
        .decode(payload.trim())
        .ok()
}

struct ReportChrome {
    title: String,
    institute_name: String,
    institute_address: String,
    teacher_name: String,
    institute_logo: Option<Vec<u8>>,
    teacher_logo: Option<Vec<u8>>,
    generated_on: NaiveDate,
    metrics: PageMetrics,
}

impl ReportChrome {
    fn new(
        title: String,
        snapshot: &Snapshot,
        generated_on: NaiveDate,
        metrics: PageMetrics,
    ) -> Self {
        let institute = &snapshot.institute;
        let teacher = &snapshot.teacher;
        Self {
            title,
            institute_name: if institute.name.is_empty() {
                "Nombre del Centro".to_string()
            } else {
                institute.name.clone()
            },
            institute_address: institute.address.clone(),
            teacher_name: if teacher.name.is_empty() {
                "Nombre del Profesor".to_string()
            } else {
                teacher.name.clone()
            },
            institute_logo: decode_logo(institute.logo.as_deref()),
            teacher_logo: decode_logo(teacher.logo.as_deref()),
            generated_on,
            metrics,
        }
    }
}

impl<S: Surface> PageChrome<S> for ReportChrome {
    fn draw_header(&self, surface: &mut S, _page_number: u32) {
        let w = self.metrics.width;
        if let Some(bytes) = &self.institute_logo {
            surface.image_jpeg(bytes, PAGE_MARGIN, 10.0, 15.0, 15.0);
        }
        if let Some(bytes) = &self.teacher_logo {
            surface.image_jpeg(bytes, w - PAGE_MARGIN - 15.0, 10.0, 15.0, 15.0);
        }

        let meta = TextStyle::body(10.0).with_color(Color::Gray(0.4));
        surface.text(PAGE_MARGIN + 17.0, 15.0, &self.institute_name, &meta);
        if !self.institute_address.is_empty() {
            surface.text(PAGE_MARGIN + 17.0, 20.0, &self.institute_address, &meta);
        }
        let teacher_x =
            w - PAGE_MARGIN - 17.0 - surface.text_width(&self.teacher_name, &meta);
        surface.text(teacher_x, 15.0, &self.teacher_name, &meta);

        let title_style = TextStyle::bold(16.0).with_color(Color::Gray(0.16));
        let title_x = (w - surface.text_width(&self.title, &title_style)) / 2.0;
        surface.text(title_x, 25.0, &self.title, &title_style);

        surface.line(PAGE_MARGIN, 32.0, w - PAGE_MARGIN, 32.0, 0.3, Color::Gray(0.7));
    }

    fn draw_footer(&self, surface: &mut S, page_number: u32) {
        let (w, h) = (self.metrics.width, self.metrics.height);
        let small = TextStyle::body(8.0).with_color(Color::Gray(0.47));
        surface.line(
            PAGE_MARGIN,
            h - 15.0,
            w - PAGE_MARGIN,
            h - 15.0,
            0.3,
            Color::Gray(0.7),
        );
        let label = format!("Página {page_number}");
        let label_x = (w - surface.text_width(&label, &small)) / 2.0;
        surface.text(label_x, h - 10.0, &label, &small);
        let stamp = fmt_es(self.generated_on);
        let stamp_x = w - PAGE_MARGIN - surface.text_width(&stamp, &small);
        surface.text(stamp_x, h - 10.0, &stamp, &small);
    }
}

// --- Formatting helpers ----------------------------------------------------

fn fmt_es(day: NaiveDate) -> String {
    day.format("%d/%m/%Y").to_string()
}

fn fmt_day_raw(raw: &str) -> String {
    parse_day(raw).map(fmt_es).unwrap_or_else(|| raw.to_string())
}

fn fmt_grade(value: Option<f64>) -> String {
    match value {
        Some(v) => format!("{v:.2}"),
        None => "-".to_string(),
    }
}

fn sum_scores(scores: &[Option<f64>]) -> Option<f64> {
    let present: Vec<f64> = scores.iter().flatten().copied().collect();
    (!present.is_empty()).then(|| present.iter().sum())
}

fn check(value: bool) -> String {
    if value { "X".to_string() } else { String::new() }
}

fn behavior_symbol(score: Option<i64>) -> String {
    match score {
        Some(2) => "++".to_string(),
        Some(1) => "+".to_string(),
        Some(0) => "-".to_string(),
        _ => String::new(),
    }
}

fn sanitize_file_component(name: &str) -> String {
    name.replace(' ', "_")
}

fn section_banner<S: Surface, C: PageChrome<S>>(
    engine: &mut LayoutEngine<'_, S, C>,
    label: &str,
) {
    let x0 = engine.metrics().margin_left;
    let width = engine.metrics().content_width();
    let text = label.to_string();
    engine.place(8.0, |surface, y| {
        surface.fill_rect(x0, y, width, 8.0, Color::Gray(0.86));
        let style = TextStyle::bold(10.0);
        let tx = x0 + (width - surface.text_width(&text, &style)) / 2.0;
        surface.text(tx, y + 5.5, &text, &style);
        8.0
    });
}

fn group_names(snapshot: &Snapshot, ids: &[String]) -> String {
    let names: Vec<&str> = ids
        .iter()
        .filter_map(|id| snapshot.group(id).map(|g| g.name.as_str()))
        .collect();
    if names.is_empty() {
        "Ninguno".to_string()
    } else {
        names.join(", ")
    }
}

/// Students holding a leader-kind role in this service, with the role name.
fn service_leaders<'a>(
    snapshot: &'a Snapshot,
    service: &Service,
) -> Vec<(&'a Student, &'a str)> {
    service
        .student_roles
        .iter()
        .filter_map(|sr| {
            let role = sr
                .role_id
                .as_deref()
                .and_then(|id| snapshot.role(id))
                .filter(|r| r.kind == RoleKind::Leader)?;
            let student = snapshot.student(&sr.student_id)?;
            Some((student, role.name.as_str()))
        })
        .collect()
}

fn elaboration_label(snapshot: &Snapshot, elaboration: Option<&Elaboration>) -> String {
    match elaboration {
        Some(e) => {
            let group = e
                .responsible_group_id
                .as_deref()
                .and_then(|id| snapshot.group(id))
                .map(|g| g.name.as_str())
                .unwrap_or("N/A");
            format!("{} (G: {})", e.name, group)
        }
        None => String::new(),
    }
}

// --- Composers -------------------------------------------------------------

/// Planning sheet: leaders/groups per area, elaboration lists, role roster.
pub fn compose_planning(
    snapshot: &Snapshot,
    service_id: &str,
    generated_on: NaiveDate,
) -> Result<ComposedDocument, CalcError> {
    let vm = build_view_model(snapshot, service_id)?;
    let metrics = PageMetrics::a4_landscape();
    let mut surface = PdfSurface::new(&metrics);
    let chrome = ReportChrome::new(
        format!("Planning del Servicio: {}", vm.service.name),
        snapshot,
        generated_on,
        metrics,
    );
    let mut engine = LayoutEngine::new(&mut surface, metrics, &chrome);
    let half = metrics.content_width() / 2.0;

    let leaders = service_leaders(snapshot, vm.service);
    if !leaders.is_empty() {
        let leader_rows: Vec<Vec<String>> = leaders
            .iter()
            .map(|(student, role)| {
                let group = snapshot
                    .group_of_student(&student.id)
                    .map(|g| g.name.clone())
                    .unwrap_or_else(|| "N/A".to_string());
                vec![student.display_name(), role.to_string(), group]
            })
            .collect();
        draw_table(
            &mut engine,
            &[
                Column::new("Responsables del Servicio", 120.0),
                Column::new("Puesto", 77.0),
                Column::new("Grupo", 70.0),
            ],
            &leader_rows,
            &TableStyle::striped(HEAD_GREEN),
        );
        engine.advance(6.0);
    }

    let comedor = group_names(snapshot, &vm.service.assigned_groups.comedor);
    let takeaway = group_names(snapshot, &vm.service.assigned_groups.takeaway);
    draw_table(
        &mut engine,
        &[Column::new("COMEDOR", half), Column::new("TAKEAWAY", half)],
        &[vec![
            format!("Grupos: {comedor}"),
            format!("Grupos: {takeaway}"),
        ]],
        &TableStyle::grid(HEAD_BLUE),
    );

    let elaborations = &vm.service.elaborations;
    let count = elaborations.comedor.len().max(elaborations.takeaway.len());
    let mut rows: Vec<Vec<String>> = (0..count)
        .map(|i| {
            vec![
                elaboration_label(snapshot, elaborations.comedor.get(i)),
                elaboration_label(snapshot, elaborations.takeaway.get(i)),
            ]
        })
        .collect();
    if rows.is_empty() {
        rows.push(vec!["-".to_string(), "-".to_string()]);
    }
    draw_table(
        &mut engine,
        &[
            Column::new("Elaboraciones Comedor", half),
            Column::new("Elaboraciones Takeaway", half),
        ],
        &rows,
        &TableStyle::striped(HEAD_SLATE),
    );

    engine.advance(10.0);

    let role_rows: Vec<Vec<String>> = vm
        .participating_students
        .iter()
        .map(|student| {
            let group = snapshot
                .group_of_student(&student.id)
                .map(|g| g.name.clone())
                .unwrap_or_else(|| "N/A".to_string());
            let role = vm
                .service
                .student_roles
                .iter()
                .find(|sr| sr.student_id == student.id)
                .and_then(|sr| sr.role_id.as_deref())
                .and_then(|id| snapshot.role(id))
                .map(|r| r.name.clone())
                .unwrap_or_else(|| "Sin asignar".to_string());
            vec![student.display_name(), group, role]
        })
        .collect();
    draw_table(
        &mut engine,
        &[
            Column::new("Alumno", 120.0),
            Column::new("Grupo", 70.0),
            Column::new("Puesto Asignado", 77.0),
        ],
        &role_rows,
        &TableStyle::striped(HEAD_GREEN),
    );

    let pages = engine.finish();
    Ok(ComposedDocument {
        file_name: format!(
            "Planning_{}.pdf",
            sanitize_file_component(&vm.service.name)
        ),
        pages,
        bytes: surface.finish(),
    })
}

/// Tracking sheet: one section per participating group, each on its own page,
/// with the latest pre-service day's checklist and behavior symbols.
pub fn compose_tracking_sheet(
    snapshot: &Snapshot,
    service_id: &str,
    generated_on: NaiveDate,
) -> Result<ComposedDocument, CalcError> {
    let vm = build_view_model(snapshot, service_id)?;
    let (day_key, day) = latest_pre_service_day(vm.evaluation)
        .ok_or_else(|| CalcError::new("not_found", "service has no pre-service days"))?;

    let metrics = PageMetrics::a4_landscape();
    let mut surface = PdfSurface::new(&metrics);
    let chrome = ReportChrome::new(
        format!("Ficha de Seguimiento - Semana del {}", fmt_day_raw(day_key)),
        snapshot,
        generated_on,
        metrics,
    );
    let mut engine = LayoutEngine::new(&mut surface, metrics, &chrome);

    let mut first = true;
    for section in &vm.grouped_students {
        if section.students.is_empty() {
            continue;
        }
        if !first {
            engine.page_break();
        }
        first = false;

        section_banner(&mut engine, &format!("Grupo: {}", section.group.name));

        let criterion_width = 60.0;
        let student_width =
            (metrics.content_width() - criterion_width) / section.students.len() as f64;
        let mut columns = vec![Column::new("Criterio", criterion_width)];
        for student in &section.students {
            columns.push(Column::new(student.short_name(), student_width).aligned(Align::Center));
        }

        let evals = &day.individual_evaluations;
        let checklist_row = |label: &str, pick: fn(&crate::model::PreServiceIndividualEvaluation) -> bool| {
            let mut row = vec![label.to_string()];
            for student in &section.students {
                row.push(check(evals.get(&student.id).map(pick).unwrap_or(true)));
            }
            row
        };

        let mut rows = vec![
            checklist_row("Asistencia", |e| e.attendance),
            checklist_row("Fichas", |e| e.has_fichas),
            checklist_row("Uniforme", |e| e.has_uniforme),
            checklist_row("Material", |e| e.has_material),
        ];
        for item in &snapshot.config.behavior_items {
            let mut row = vec![item.label.clone()];
            for student in &section.students {
                let score = evals
                    .get(&student.id)
                    .and_then(|e| e.behavior_scores.get(&item.id).copied())
                    .flatten();
                row.push(behavior_symbol(score));
            }
            rows.push(row);
        }
        let mut observations = vec!["Observaciones".to_string()];
        for student in &section.students {
            observations.push(
                evals
                    .get(&student.id)
                    .map(|e| e.observations.clone())
                    .unwrap_or_default(),
            );
        }
        rows.push(observations);

        draw_table(
            &mut engine,
            &columns,
            &rows,
            &TableStyle::grid(HEAD_BLUE).sized(8.0),
        );
    }

    let pages = engine.finish();
    Ok(ComposedDocument {
        file_name: format!(
            "Ficha_Seguimiento_{}.pdf",
            sanitize_file_component(&vm.service.name)
        ),
        pages,
        bytes: surface.finish(),
    })
}

/// Evaluation report: cross-group score table, then one page per group with
/// a per-student criterion table and computed totals.
pub fn compose_evaluation_report(
    snapshot: &Snapshot,
    service_id: &str,
    generated_on: NaiveDate,
) -> Result<ComposedDocument, CalcError> {
    let vm = build_view_model(snapshot, service_id)?;
    let metrics = PageMetrics::a4_portrait();
    let mut surface = PdfSurface::new(&metrics);
    let chrome = ReportChrome::new(
        format!("Informe de Evaluación: {}", vm.service.name),
        snapshot,
        generated_on,
        metrics,
    );
    let mut engine = LayoutEngine::new(&mut surface, metrics, &chrome);

    let group_rows: Vec<Vec<String>> = vm
        .grouped_students
        .iter()
        .map(|section| {
            let scores = vm.evaluation.service_day.group_scores.get(&section.group.id);
            vec![
                section.group.name.clone(),
                fmt_grade(scores.and_then(|g| sum_scores(&g.scores))),
                scores.map(|g| g.observations.clone()).unwrap_or_default(),
            ]
        })
        .collect();
    draw_table(
        &mut engine,
        &[
            Column::new("Grupo", 50.0),
            Column::new("Nota Día de Servicio", 40.0).aligned(Align::Center),
            Column::new("Observaciones", 90.0),
        ],
        &group_rows,
        &TableStyle::grid(HEAD_BLUE),
    );

    let pre_service_day = latest_pre_service_day(vm.evaluation).map(|(_, day)| day);
    for section in &vm.grouped_students {
        if section.students.is_empty() {
            continue;
        }
        engine.page_break();
        section_banner(&mut engine, &format!("Grupo: {}", section.group.name));

        let criterion_width = 70.0;
        let student_width =
            (metrics.content_width() - criterion_width) / section.students.len() as f64;
        let mut columns = vec![Column::new("Criterio", criterion_width)];
        for student in &section.students {
            columns.push(Column::new(student.short_name(), student_width).aligned(Align::Center));
        }

        let mut rows: Vec<Vec<String>> = Vec::new();
        if let Some(day) = pre_service_day {
            let evals = &day.individual_evaluations;
            let checklist: [(&str, fn(&crate::model::PreServiceIndividualEvaluation) -> bool); 4] = [
                ("Asistencia", |e| e.attendance),
                ("Fichas", |e| e.has_fichas),
                ("Uniforme", |e| e.has_uniforme),
                ("Material", |e| e.has_material),
            ];
            for (label, pick) in checklist {
                let mut row = vec![label.to_string()];
                for student in &section.students {
                    row.push(check(evals.get(&student.id).map(pick).unwrap_or(true)));
                }
                rows.push(row);
            }
            for item in &snapshot.config.behavior_items {
                let mut row = vec![item.label.clone()];
                for student in &section.students {
                    let score = evals
                        .get(&student.id)
                        .and_then(|e| e.behavior_scores.get(&item.id).copied())
                        .flatten();
                    row.push(behavior_symbol(score));
                }
                rows.push(row);
            }
        }
        for (i, item) in snapshot.config.service_day_items.iter().enumerate() {
            let mut row = vec![item.clone()];
            for student in &section.students {
                let score = vm
                    .evaluation
                    .service_day
                    .individual_scores
                    .get(&student.id)
                    .and_then(|ind| ind.scores.get(i).copied())
                    .flatten();
                row.push(fmt_grade(score));
            }
            rows.push(row);
        }
        let mut totals = vec!["Total Individual".to_string()];
        for student in &section.students {
            let total = vm
                .evaluation
                .service_day
                .individual_scores
                .get(&student.id)
                .and_then(|ind| sum_scores(&ind.scores));
            totals.push(fmt_grade(total));
        }
        rows.push(totals);

        draw_table(
            &mut engine,
            &columns,
            &rows,
            &TableStyle::grid(HEAD_BLUE).sized(8.0),
        );
    }

    let pages = engine.finish();
    Ok(ComposedDocument {
        file_name: format!(
            "Informe_Evaluacion_{}.pdf",
            sanitize_file_component(&vm.service.name)
        ),
        pages,
        bytes: surface.finish(),
    })
}

/// Per-student dossier for one service: identity and grade summary, the
/// student's pre-service and service-day records, their group's scores, and
/// the attendance incidents inside the service week.
pub fn compose_student_dossier(
    snapshot: &Snapshot,
    service_id: &str,
    student_id: &str,
    generated_on: NaiveDate,
) -> Result<ComposedDocument, CalcError> {
    let student = snapshot
        .student(student_id)
        .ok_or_else(|| CalcError::new("not_found", "student not found"))?;
    let vm = build_view_model(snapshot, service_id)?;
    let grades = calc::compute_student_grades(snapshot, &snapshot.config, student_id)?;

    let metrics = PageMetrics::a4_portrait();
    let mut surface = PdfSurface::new(&metrics);
    let chrome = ReportChrome::new(
        "Ficha Académica Individual".to_string(),
        snapshot,
        generated_on,
        metrics,
    );
    let mut engine = LayoutEngine::new(&mut surface, metrics, &chrome);

    let full_name = format!(
        "{} {} {}",
        student.nombre, student.apellido1, student.apellido2
    );
    let nre = format!("NRE: {}", student.nre);
    let grupo = format!("Grupo: {}", student.grupo);
    engine.place(26.0, |s, y| {
        s.text(PAGE_MARGIN, y + 6.0, &full_name, &TextStyle::bold(14.0));
        let detail = TextStyle::body(11.0).with_color(Color::Gray(0.4));
        s.text(PAGE_MARGIN, y + 13.0, &nre, &detail);
        s.text(PAGE_MARGIN, y + 20.0, &grupo, &detail);
        26.0
    });

    draw_table(
        &mut engine,
        &[
            Column::new("Resumen de Calificaciones", 120.0),
            Column::new("Nota", 60.0).aligned(Align::Center),
        ],
        &[
            vec![
                "Media de Servicios Prácticos".to_string(),
                fmt_grade(grades.service_average),
            ],
            vec![
                "Examen Práctico T1".to_string(),
                fmt_grade(grades.practical_exams.t1),
            ],
            vec![
                "Examen Práctico T2".to_string(),
                fmt_grade(grades.practical_exams.t2),
            ],
            vec![
                "Examen Práctico REC".to_string(),
                fmt_grade(grades.practical_exams.rec),
            ],
        ],
        &TableStyle::grid(HEAD_BLUE),
    );
    engine.advance(6.0);

    // Pre-service record, one row per preparatory day.
    let mut day_keys: Vec<&String> = vm.evaluation.pre_service.keys().collect();
    day_keys.sort_by(|a, b| (parse_day(a), a.as_str()).cmp(&(parse_day(b), b.as_str())));
    if !day_keys.is_empty() {
        section_banner(&mut engine, "Pre-Servicio");
        let rows: Vec<Vec<String>> = day_keys
            .iter()
            .map(|key| {
                let eval = vm.evaluation.pre_service[*key]
                    .individual_evaluations
                    .get(&student.id);
                vec![
                    fmt_day_raw(key),
                    check(eval.map(|e| e.attendance).unwrap_or(true)),
                    check(eval.map(|e| e.has_fichas).unwrap_or(true)),
                    check(eval.map(|e| e.has_uniforme).unwrap_or(true)),
                    check(eval.map(|e| e.has_material).unwrap_or(true)),
                    eval.map(|e| e.observations.clone()).unwrap_or_default(),
                ]
            })
            .collect();
        draw_table(
            &mut engine,
            &[
                Column::new("Fecha", 28.0),
                Column::new("Asistencia", 22.0).aligned(Align::Center),
                Column::new("Fichas", 18.0).aligned(Align::Center),
                Column::new("Uniforme", 20.0).aligned(Align::Center),
                Column::new("Material", 20.0).aligned(Align::Center),
                Column::new("Observaciones", 72.0),
            ],
            &rows,
            &TableStyle::striped(HEAD_SLATE).sized(8.0),
        );
        engine.advance(6.0);
    }

    // Service-day scores for the student.
    let individual = vm
        .evaluation
        .service_day
        .individual_scores
        .get(&student.id);
    section_banner(&mut engine, "Día de Servicio");
    let mut day_rows: Vec<Vec<String>> = vec![vec![
        "Asistencia".to_string(),
        if individual.map(|i| i.attendance).unwrap_or(false) {
            "Sí".to_string()
        } else {
            "No".to_string()
        },
    ]];
    for (i, item) in snapshot.config.service_day_items.iter().enumerate() {
        day_rows.push(vec![
            item.clone(),
            fmt_grade(individual.and_then(|ind| ind.scores.get(i).copied()).flatten()),
        ]);
    }
    day_rows.push(vec![
        "Total".to_string(),
        fmt_grade(individual.and_then(|ind| sum_scores(&ind.scores))),
    ]);
    if let Some(obs) = individual.map(|i| i.observations.clone()) {
        if !obs.is_empty() {
            day_rows.push(vec!["Observaciones".to_string(), obs]);
        }
    }
    draw_table(
        &mut engine,
        &[
            Column::new("Criterio", 120.0),
            Column::new("Nota", 60.0).aligned(Align::Center),
        ],
        &day_rows,
        &TableStyle::grid(HEAD_GREEN),
    );
    engine.advance(6.0);

    // Group scores through the student's first practice group.
    if let Some(group) = snapshot.group_of_student(&student.id) {
        if let Some(scores) = vm.evaluation.service_day.group_scores.get(&group.id) {
            section_banner(&mut engine, &format!("Grupo: {}", group.name));
            let mut group_rows: Vec<Vec<String>> = snapshot
                .config
                .group_day_items
                .iter()
                .enumerate()
                .map(|(i, item)| {
                    vec![
                        item.clone(),
                        fmt_grade(scores.scores.get(i).copied().flatten()),
                    ]
                })
                .collect();
            group_rows.push(vec![
                "Total".to_string(),
                fmt_grade(sum_scores(&scores.scores)),
            ]);
            if !scores.observations.is_empty() {
                group_rows.push(vec!["Observaciones".to_string(), scores.observations.clone()]);
            }
            draw_table(
                &mut engine,
                &[
                    Column::new("Criterio", 120.0),
                    Column::new("Nota", 60.0).aligned(Align::Center),
                ],
                &group_rows,
                &TableStyle::grid(HEAD_SLATE),
            );
            engine.advance(6.0);
        }
    }

    // Incidents inside the Monday-Sunday week containing the service date.
    if let Some(service_date) = parse_day(&vm.service.date) {
        let incidents = student_incidents_in_week(snapshot, &student.id, service_date);
        if !incidents.is_empty() {
            let rows: Vec<Vec<String>> = incidents
                .iter()
                .map(|r| vec![fmt_day_raw(&r.date), r.kind.clone(), r.reason.clone()])
                .collect();
            draw_table(
                &mut engine,
                &[
                    Column::new("Fecha", 28.0),
                    Column::new("Tipo", 45.0),
                    Column::new("Motivo", 107.0),
                ],
                &rows,
                &TableStyle::striped(HEAD_ORANGE),
            );
        }
    }

    let pages = engine.finish();
    Ok(ComposedDocument {
        file_name: format!(
            "Informe_{}_{}.pdf",
            sanitize_file_component(&student.apellido1),
            sanitize_file_component(&student.nombre)
        ),
        pages,
        bytes: surface.finish(),
    })
}
