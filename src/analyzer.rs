use crate::models::{
    Attendance, ClassifiedRecord, Condition, Config, InputRecord, LevelingArea, LevelingFlag,
};
use crate::normalizer::{normalize_exam_date, to_percentage};
use crate::progress::ProgressObserver;
use tracing::debug;

/// Normalized section percentages of one student.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct SectionScores {
    pub communication: f64,
    pub communicative_skills: f64,
    pub mathematics: f64,
    pub science: f64,
}

impl SectionScores {
    pub fn from_record(record: &InputRecord) -> Self {
        Self {
            communication: to_percentage(&record.communication_pct),
            communicative_skills: to_percentage(&record.communicative_skills_pct),
            mathematics: to_percentage(&record.mathematics_pct),
            science: to_percentage(&record.science_pct),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Default)]
pub struct ClassificationSummary {
    pub total: usize,
    pub attended: usize,
    pub absent: usize,
    pub admitted: usize,
    pub requiring_leveling: usize,
    pub area_counts: Vec<(LevelingArea, usize)>, // LevelingArea::ALL order, zero counts omitted
}

pub struct RecordClassifier<'a> {
    pub config: &'a Config,
}

impl<'a> RecordClassifier<'a> {
    pub fn new(config: &'a Config) -> Self {
        Self { config }
    }

    /// Leveling areas a student must take, in check order.
    /// Students who did not attend never get leveling.
    pub fn leveling_areas(
        &self,
        scores: &SectionScores,
        attendance: Attendance,
        program: &str,
    ) -> Vec<LevelingArea> {
        let mut areas = Vec::new();
        if attendance == Attendance::Absent {
            return areas;
        }

        let threshold = self.config.leveling_threshold;
        if scores.communication <= threshold {
            areas.push(LevelingArea::Communication);
        }
        if scores.communicative_skills <= threshold {
            areas.push(LevelingArea::CommunicativeSkills);
        }
        if scores.mathematics <= threshold {
            areas.push(LevelingArea::Mathematics);
        }
        if scores.science <= threshold {
            // Law and business programs level in social sciences instead
            if self.config.is_social_science_program(program) {
                areas.push(LevelingArea::SocialSciences);
            } else {
                areas.push(LevelingArea::ScienceTechnology);
            }
        }

        areas
    }

    pub fn condition(&self, attendance: Attendance, total_pct: f64) -> Condition {
        if attendance == Attendance::Attended && total_pct >= self.config.admission_threshold {
            Condition::Admitted
        } else {
            Condition::NotAdmitted
        }
    }

    /// Classify a single row; `id` is its 1-based position in the batch.
    pub fn classify_record(&self, id: usize, record: &InputRecord) -> ClassifiedRecord {
        let attendance = Attendance::from_marker(&record.attendance);
        let total_pct = to_percentage(&record.total_pct);
        let condition = self.condition(attendance, total_pct);

        let scores = SectionScores::from_record(record);
        let program = record.program.to_string();
        let leveling_areas = self.leveling_areas(&scores, attendance, &program);

        ClassifiedRecord {
            id,
            term: self.config.term_label.clone(),
            student_code: record.student_code.clone(),
            last_names: record.last_names.clone(),
            first_names: record.first_names.clone(),
            national_id: record.national_id.clone(),
            area: record.area.clone(),
            program: record.program.clone(),
            exam_site: record.exam_site.clone(),
            modality: record.modality.clone(),
            score: record.total.clone(),
            attendance,
            condition,
            leveling_areas,
            registered_at: normalize_exam_date(&record.exam_date),
        }
    }

    /// Classify the whole batch in input order, reporting progress after each row.
    pub fn classify_all(
        &self,
        records: &[InputRecord],
        progress: &mut dyn ProgressObserver,
    ) -> Vec<ClassifiedRecord> {
        let total = records.len();
        let mut classified = Vec::with_capacity(total);

        for (i, record) in records.iter().enumerate() {
            let result = self.classify_record(i + 1, record);
            debug!(
                id = result.id,
                asistio = %result.attendance,
                condicion = %result.condition,
                areas = result.leveling_areas.len(),
                "classified row"
            );
            classified.push(result);
            progress.report((i + 1) as f64 / total as f64);
        }
        progress.finish();

        classified
    }

    pub fn summarize(&self, records: &[ClassifiedRecord]) -> ClassificationSummary {
        let attended = records
            .iter()
            .filter(|r| r.attendance == Attendance::Attended)
            .count();
        let area_counts = LevelingArea::ALL
            .into_iter()
            .map(|area| {
                let count = records
                    .iter()
                    .filter(|r| r.leveling_areas.contains(&area))
                    .count();
                (area, count)
            })
            .filter(|(_, count)| *count > 0)
            .collect();

        ClassificationSummary {
            total: records.len(),
            attended,
            absent: records.len() - attended,
            admitted: records
                .iter()
                .filter(|r| r.condition == Condition::Admitted)
                .count(),
            requiring_leveling: records
                .iter()
                .filter(|r| r.requires_leveling() == LevelingFlag::Required)
                .count(),
            area_counts,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{areas_to_json, Column, RawValue};
    use crate::progress::testing::RecordingProgress;
    use crate::progress::NoProgress;
    use proptest::prelude::*;

    fn passing_scores() -> SectionScores {
        SectionScores {
            communication: 60.0,
            communicative_skills: 60.0,
            mathematics: 60.0,
            science: 60.0,
        }
    }

    #[test]
    fn test_end_to_end_row() {
        let config = Config::default();
        let classifier = RecordClassifier::new(&config);
        let record = InputRecord::default()
            .with(Column::Attendance, "Asistió")
            .with(Column::TotalPct, 0.95)
            .with(Column::CommunicationPct, "25%")
            .with(Column::CommunicativeSkillsPct, 60i64)
            .with(Column::MathematicsPct, 40i64)
            .with(Column::SciencePct, 20i64)
            .with(Column::Program, "Derecho");

        let result = classifier.classify_record(1, &record);
        assert_eq!(result.attendance.to_string(), "ASISTIÓ");
        assert_eq!(result.condition.to_string(), "INGRESÓ");
        assert_eq!(
            result.leveling_areas,
            vec![LevelingArea::Communication, LevelingArea::SocialSciences]
        );
        assert_eq!(result.requires_leveling().to_string(), "SI");

        let json: serde_json::Value =
            serde_json::from_str(&areas_to_json(&result.leveling_areas).unwrap()).unwrap();
        assert_eq!(
            json,
            serde_json::json!([{"curso": "COMUNICACIÓN"}, {"curso": "CIENCIAS SOCIALES"}])
        );
    }

    #[test]
    fn test_absent_student_gets_no_leveling() {
        let config = Config::default();
        let classifier = RecordClassifier::new(&config);
        for marker in ["NO ASISTIÓ", "no asistió", "  No Asistió  "] {
            let record = InputRecord::default()
                .with(Column::Attendance, marker)
                .with(Column::TotalPct, 90i64);
            let result = classifier.classify_record(1, &record);
            assert_eq!(result.attendance, Attendance::Absent);
            assert_eq!(result.condition, Condition::NotAdmitted);
            assert!(result.leveling_areas.is_empty());
            assert_eq!(result.requires_leveling().to_string(), "NO");
        }
    }

    #[test]
    fn test_threshold_is_inclusive() {
        let config = Config::default();
        let classifier = RecordClassifier::new(&config);

        let mut scores = passing_scores();
        scores.communication = 30.0;
        let areas = classifier.leveling_areas(&scores, Attendance::Attended, "Medicina");
        assert_eq!(areas, vec![LevelingArea::Communication]);

        scores.communication = 31.0;
        let areas = classifier.leveling_areas(&scores, Attendance::Attended, "Medicina");
        assert!(areas.is_empty());
    }

    #[test]
    fn test_science_area_depends_on_program() {
        let config = Config::default();
        let classifier = RecordClassifier::new(&config);
        let mut scores = passing_scores();
        scores.science = 10.0;

        assert_eq!(
            classifier.leveling_areas(&scores, Attendance::Attended, "Derecho"),
            vec![LevelingArea::SocialSciences]
        );
        assert_eq!(
            classifier.leveling_areas(&scores, Attendance::Attended, "contabilidad"),
            vec![LevelingArea::SocialSciences]
        );
        assert_eq!(
            classifier.leveling_areas(&scores, Attendance::Attended, "Ingeniería Civil"),
            vec![LevelingArea::ScienceTechnology]
        );
    }

    #[test]
    fn test_all_areas_in_check_order() {
        let config = Config::default();
        let classifier = RecordClassifier::new(&config);
        let record = InputRecord::default().with(Column::Program, "Enfermería");

        // Blank scores normalize to 0, so every area applies
        let result = classifier.classify_record(1, &record);
        assert_eq!(
            result.leveling_areas,
            vec![
                LevelingArea::Communication,
                LevelingArea::CommunicativeSkills,
                LevelingArea::Mathematics,
                LevelingArea::ScienceTechnology,
            ]
        );
        assert_eq!(result.condition, Condition::NotAdmitted);
    }

    #[test]
    fn test_admission_threshold_is_literal() {
        let config = Config::default();
        let classifier = RecordClassifier::new(&config);
        assert_eq!(classifier.condition(Attendance::Attended, 1.0), Condition::Admitted);
        assert_eq!(classifier.condition(Attendance::Attended, 0.5), Condition::NotAdmitted);
        assert_eq!(classifier.condition(Attendance::Absent, 100.0), Condition::NotAdmitted);
    }

    #[test]
    fn test_configured_policy() {
        let config = Config {
            leveling_threshold: 50.0,
            admission_threshold: 60.0,
            social_science_programs: vec!["Psicología".to_string()],
            ..Config::default()
        };
        let classifier = RecordClassifier::new(&config);
        let record = InputRecord::default()
            .with(Column::Program, "PSICOLOGÍA")
            .with(Column::TotalPct, "55%")
            .with(Column::CommunicationPct, 45i64)
            .with(Column::CommunicativeSkillsPct, 80i64)
            .with(Column::MathematicsPct, 80i64)
            .with(Column::SciencePct, 50i64);

        let result = classifier.classify_record(1, &record);
        assert_eq!(result.condition, Condition::NotAdmitted);
        assert_eq!(
            result.leveling_areas,
            vec![LevelingArea::Communication, LevelingArea::SocialSciences]
        );
    }

    #[test]
    fn test_copied_fields_and_date() {
        let config = Config::default();
        let classifier = RecordClassifier::new(&config);
        let record = InputRecord::default()
            .with(Column::StudentCode, "A-001")
            .with(Column::LastNames, "Quispe Mamani")
            .with(Column::NationalId, 70123456i64)
            .with(Column::ExamSite, "Sede Central")
            .with(Column::Modality, "Ordinario")
            .with(Column::Total, 152.5)
            .with(Column::ExamDate, "15/03/2026");

        let result = classifier.classify_record(7, &record);
        assert_eq!(result.id, 7);
        assert_eq!(result.term, "2026-1");
        assert_eq!(result.student_code, RawValue::Text("A-001".into()));
        assert_eq!(result.national_id, RawValue::Int(70123456));
        assert_eq!(result.score, RawValue::Float(152.5));
        assert_eq!(result.registered_at, "2026-03-15 00:00:00");
        assert_eq!(result.first_names, RawValue::Empty);
    }

    #[test]
    fn test_batch_preserves_order_and_reports_progress() {
        let config = Config::default();
        let classifier = RecordClassifier::new(&config);
        let records: Vec<InputRecord> = (0..4)
            .map(|i| InputRecord::default().with(Column::StudentCode, format!("S{}", i)))
            .collect();

        let mut progress = RecordingProgress::default();
        let classified = classifier.classify_all(&records, &mut progress);

        assert_eq!(classified.len(), 4);
        for (i, record) in classified.iter().enumerate() {
            assert_eq!(record.id, i + 1);
            assert_eq!(record.student_code, RawValue::Text(format!("S{}", i)));
        }
        assert_eq!(progress.fractions, vec![0.25, 0.5, 0.75, 1.0]);
        assert!(progress.finished);
    }

    #[test]
    fn test_empty_batch() {
        let config = Config::default();
        let classifier = RecordClassifier::new(&config);
        let mut progress = RecordingProgress::default();
        assert!(classifier.classify_all(&[], &mut progress).is_empty());
        assert!(progress.fractions.is_empty());
    }

    #[test]
    fn test_summary_counts() {
        let config = Config::default();
        let classifier = RecordClassifier::new(&config);
        let records = vec![
            InputRecord::default()
                .with(Column::Attendance, "Asistió")
                .with(Column::TotalPct, 80i64)
                .with(Column::CommunicationPct, 20i64)
                .with(Column::CommunicativeSkillsPct, 70i64)
                .with(Column::MathematicsPct, 70i64)
                .with(Column::SciencePct, 70i64),
            InputRecord::default()
                .with(Column::Attendance, "NO ASISTIÓ"),
            InputRecord::default()
                .with(Column::TotalPct, 0.9)
                .with(Column::CommunicationPct, 90i64)
                .with(Column::CommunicativeSkillsPct, 90i64)
                .with(Column::MathematicsPct, 90i64)
                .with(Column::SciencePct, 90i64),
        ];

        let classified = classifier.classify_all(&records, &mut NoProgress);
        let summary = classifier.summarize(&classified);

        assert_eq!(summary.total, 3);
        assert_eq!(summary.attended, 2);
        assert_eq!(summary.absent, 1);
        assert_eq!(summary.admitted, 2);
        assert_eq!(summary.requiring_leveling, 1);
        assert_eq!(summary.area_counts, vec![(LevelingArea::Communication, 1)]);
    }

    proptest! {
        #[test]
        fn leveling_flag_matches_areas(
            attended in any::<bool>(),
            comm in 0.0f64..100.0,
            skills in 0.0f64..100.0,
            math in 0.0f64..100.0,
            science in 0.0f64..100.0,
            program in prop::sample::select(vec!["Derecho", "Medicina", "CONTABILIDAD", ""]),
        ) {
            let config = Config::default();
            let classifier = RecordClassifier::new(&config);
            let record = InputRecord::default()
                .with(Column::Attendance, if attended { "Asistió" } else { "NO ASISTIÓ" })
                .with(Column::CommunicationPct, comm)
                .with(Column::CommunicativeSkillsPct, skills)
                .with(Column::MathematicsPct, math)
                .with(Column::SciencePct, science)
                .with(Column::Program, program);

            let result = classifier.classify_record(1, &record);
            prop_assert_eq!(
                result.requires_leveling() == LevelingFlag::Required,
                !result.leveling_areas.is_empty()
            );
            prop_assert!(result.leveling_areas.len() <= 4);
            if !attended {
                prop_assert!(result.leveling_areas.is_empty());
                prop_assert_eq!(result.condition, Condition::NotAdmitted);
            }
        }
    }
}
