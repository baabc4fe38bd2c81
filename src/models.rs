use anyhow::{bail, Context};
use chrono::NaiveDateTime;
use serde::ser::Error as _;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::io;
use std::str::FromStr;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Academic period stamped on every classified row
    pub term_label: String,
    /// Subject percentage at or below which leveling is required
    pub leveling_threshold: f64,
    /// Minimum normalized total percentage for admission
    pub admission_threshold: f64,
    /// Programs whose science leveling is replaced by social sciences
    pub social_science_programs: Vec<String>,
    // Workbook layout
    pub input_sheet: Option<String>,
    pub output_sheet: String,
    pub template_sheet: String,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            term_label: "2026-1".to_string(),
            leveling_threshold: 30.0,
            admission_threshold: 1.0,
            social_science_programs: vec![
                "DERECHO".to_string(),
                "CONTABILIDAD".to_string(),
                "ADMINISTRACIÓN DE EMPRESAS".to_string(),
            ],
            input_sheet: None,
            output_sheet: "Resultados".to_string(),
            template_sheet: "Plantilla".to_string(),
        }
    }
}

impl Config {
    pub fn load_from_file(file_path: &str) -> anyhow::Result<Self> {
        let content = std::fs::read_to_string(file_path)
            .with_context(|| format!("Failed to read config file: {}", file_path))?;
        let config: Config = toml::from_str(&content)
            .with_context(|| format!("Invalid config file: {}", file_path))?;
        config.validate()?;
        Ok(config)
    }

    pub fn save_to_file(&self, file_path: &str) -> anyhow::Result<()> {
        let content = toml::to_string_pretty(self)?;
        std::fs::write(file_path, content)
            .with_context(|| format!("Failed to write config file: {}", file_path))?;
        Ok(())
    }

    pub fn validate(&self) -> anyhow::Result<()> {
        if self.term_label.trim().is_empty() {
            bail!("term_label must not be empty");
        }
        for (name, value) in [
            ("leveling_threshold", self.leveling_threshold),
            ("admission_threshold", self.admission_threshold),
        ] {
            if !(0.0..=100.0).contains(&value) {
                bail!("{} must be within 0..=100, got {}", name, value);
            }
        }
        if self.output_sheet.trim().is_empty() || self.template_sheet.trim().is_empty() {
            bail!("sheet names must not be empty");
        }
        Ok(())
    }

    /// Case-insensitive membership in the social-science program list
    pub fn is_social_science_program(&self, program: &str) -> bool {
        let program = program.trim().to_uppercase();
        self.social_science_programs
            .iter()
            .any(|p| p.trim().to_uppercase() == program)
    }
}

/// Columns of the admission exam input sheet, in template order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Column {
    StudentCode,
    LastNames,
    FirstNames,
    NationalId,
    Area,
    Program,
    ExamSite,
    Modality,
    Attendance,
    ExamDate,
    Communication,
    CommunicationPct,
    CommunicativeSkills,
    CommunicativeSkillsPct,
    Mathematics,
    MathematicsPct,
    Science,
    SciencePct,
    Total,
    TotalPct,
}

impl Column {
    pub const ALL: [Column; 20] = [
        Column::StudentCode,
        Column::LastNames,
        Column::FirstNames,
        Column::NationalId,
        Column::Area,
        Column::Program,
        Column::ExamSite,
        Column::Modality,
        Column::Attendance,
        Column::ExamDate,
        Column::Communication,
        Column::CommunicationPct,
        Column::CommunicativeSkills,
        Column::CommunicativeSkillsPct,
        Column::Mathematics,
        Column::MathematicsPct,
        Column::Science,
        Column::SciencePct,
        Column::Total,
        Column::TotalPct,
    ];

    pub fn header(self) -> &'static str {
        match self {
            Column::StudentCode => "CODIGO DE ESTUDIANTE",
            Column::LastNames => "APELLIDOS",
            Column::FirstNames => "NOMBRES",
            Column::NationalId => "DNI",
            Column::Area => "AREA",
            Column::Program => "CARRERA",
            Column::ExamSite => "SEDE DE ESTUDIO",
            Column::Modality => "MODALIDAD",
            Column::Attendance => "ASISTENCIA",
            Column::ExamDate => "FECHA DE EXAMEN",
            Column::Communication => "COMUNICACIÓN",
            Column::CommunicationPct => "COMUNICACIÓN %",
            Column::CommunicativeSkills => "HABILIDADES COMUNICATIVAS",
            Column::CommunicativeSkillsPct => "HABILIDADES COMUNICATIVAS %",
            Column::Mathematics => "MATEMÁTICA",
            Column::MathematicsPct => "MATEMÁTICA %",
            Column::Science => "CIENCIA, TECNOLOGÍA Y AMBIENTE",
            Column::SciencePct => "CIENCIA, TECNOLOGÍA Y AMBIENTE %",
            Column::Total => "TOTAL",
            Column::TotalPct => "TOTAL %",
        }
    }

    /// Match a sheet header, ignoring surrounding whitespace and case
    pub fn from_header(header: &str) -> Option<Column> {
        let wanted = header.trim().to_uppercase();
        Column::ALL.into_iter().find(|c| c.header() == wanted)
    }
}

/// A spreadsheet cell as it arrives from the input workbook.
#[derive(Debug, Clone, PartialEq, Default)]
pub enum RawValue {
    #[default]
    Empty,
    Int(i64),
    Float(f64),
    Text(String),
    Bool(bool),
    DateTime(NaiveDateTime),
}

impl RawValue {
    pub fn is_empty(&self) -> bool {
        match self {
            RawValue::Empty => true,
            RawValue::Text(s) => s.is_empty(),
            _ => false,
        }
    }
}

impl fmt::Display for RawValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RawValue::Empty => Ok(()),
            RawValue::Int(n) => write!(f, "{}", n),
            // Integral floats print like the integers spreadsheets show
            RawValue::Float(x) if x.is_finite() && x.fract() == 0.0 && x.abs() < 1e15 => {
                write!(f, "{:.0}", x)
            }
            RawValue::Float(x) => write!(f, "{}", x),
            RawValue::Text(s) => f.write_str(s),
            RawValue::Bool(true) => f.write_str("TRUE"),
            RawValue::Bool(false) => f.write_str("FALSE"),
            RawValue::DateTime(dt) => write!(f, "{}", dt.format("%Y-%m-%d %H:%M:%S")),
        }
    }
}

impl From<&str> for RawValue {
    fn from(value: &str) -> Self {
        RawValue::Text(value.to_string())
    }
}

impl From<String> for RawValue {
    fn from(value: String) -> Self {
        RawValue::Text(value)
    }
}

impl From<i64> for RawValue {
    fn from(value: i64) -> Self {
        RawValue::Int(value)
    }
}

impl From<f64> for RawValue {
    fn from(value: f64) -> Self {
        RawValue::Float(value)
    }
}

/// One student row of the input sheet. Columns absent from the sheet stay `Empty`.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct InputRecord {
    pub student_code: RawValue,
    pub last_names: RawValue,
    pub first_names: RawValue,
    pub national_id: RawValue,
    pub area: RawValue,
    pub program: RawValue,
    pub exam_site: RawValue,
    pub modality: RawValue,
    pub attendance: RawValue,
    pub exam_date: RawValue,
    pub communication: RawValue,
    pub communication_pct: RawValue,
    pub communicative_skills: RawValue,
    pub communicative_skills_pct: RawValue,
    pub mathematics: RawValue,
    pub mathematics_pct: RawValue,
    pub science: RawValue,
    pub science_pct: RawValue,
    pub total: RawValue,
    pub total_pct: RawValue,
}

impl InputRecord {
    fn slot(&mut self, column: Column) -> &mut RawValue {
        match column {
            Column::StudentCode => &mut self.student_code,
            Column::LastNames => &mut self.last_names,
            Column::FirstNames => &mut self.first_names,
            Column::NationalId => &mut self.national_id,
            Column::Area => &mut self.area,
            Column::Program => &mut self.program,
            Column::ExamSite => &mut self.exam_site,
            Column::Modality => &mut self.modality,
            Column::Attendance => &mut self.attendance,
            Column::ExamDate => &mut self.exam_date,
            Column::Communication => &mut self.communication,
            Column::CommunicationPct => &mut self.communication_pct,
            Column::CommunicativeSkills => &mut self.communicative_skills,
            Column::CommunicativeSkillsPct => &mut self.communicative_skills_pct,
            Column::Mathematics => &mut self.mathematics,
            Column::MathematicsPct => &mut self.mathematics_pct,
            Column::Science => &mut self.science,
            Column::SciencePct => &mut self.science_pct,
            Column::Total => &mut self.total,
            Column::TotalPct => &mut self.total_pct,
        }
    }

    pub fn set(&mut self, column: Column, value: RawValue) {
        *self.slot(column) = value;
    }

    pub fn with(mut self, column: Column, value: impl Into<RawValue>) -> Self {
        self.set(column, value.into());
        self
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Attendance {
    Attended,
    Absent,
}

impl Attendance {
    /// Only an explicit "NO ASISTIÓ" marks a student absent; anything else,
    /// including a blank cell, counts as attended.
    pub fn from_marker(marker: &RawValue) -> Self {
        if marker.to_string().trim().to_uppercase() == "NO ASISTIÓ" {
            Attendance::Absent
        } else {
            Attendance::Attended
        }
    }
}

impl fmt::Display for Attendance {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Attendance::Attended => "ASISTIÓ",
            Attendance::Absent => "NO ASISTIÓ",
        })
    }
}

impl FromStr for Attendance {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "ASISTIÓ" => Ok(Attendance::Attended),
            "NO ASISTIÓ" => Ok(Attendance::Absent),
            other => Err(format!("unknown attendance value: {}", other)),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Condition {
    Admitted,
    NotAdmitted,
}

impl fmt::Display for Condition {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Condition::Admitted => "INGRESÓ",
            Condition::NotAdmitted => "NO INGRESÓ",
        })
    }
}

impl FromStr for Condition {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "INGRESÓ" => Ok(Condition::Admitted),
            "NO INGRESÓ" => Ok(Condition::NotAdmitted),
            other => Err(format!("unknown condition value: {}", other)),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LevelingFlag {
    Required,
    NotRequired,
}

impl fmt::Display for LevelingFlag {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            LevelingFlag::Required => "SI",
            LevelingFlag::NotRequired => "NO",
        })
    }
}

impl FromStr for LevelingFlag {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "SI" => Ok(LevelingFlag::Required),
            "NO" => Ok(LevelingFlag::NotRequired),
            other => Err(format!("unknown leveling flag: {}", other)),
        }
    }
}

/// Remedial course areas, declared in the order they are checked.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum LevelingArea {
    Communication,
    CommunicativeSkills,
    Mathematics,
    SocialSciences,
    ScienceTechnology,
}

impl LevelingArea {
    pub const ALL: [LevelingArea; 5] = [
        LevelingArea::Communication,
        LevelingArea::CommunicativeSkills,
        LevelingArea::Mathematics,
        LevelingArea::SocialSciences,
        LevelingArea::ScienceTechnology,
    ];

    pub fn tag(self) -> &'static str {
        match self {
            LevelingArea::Communication => "COMUNICACIÓN",
            LevelingArea::CommunicativeSkills => "HABILIDADES COMUNICATIVAS",
            LevelingArea::Mathematics => "MATEMATICA",
            LevelingArea::SocialSciences => "CIENCIAS SOCIALES",
            LevelingArea::ScienceTechnology => "CIENCIA, TECNOLOGÍA Y AMBIENTE",
        }
    }
}

impl fmt::Display for LevelingArea {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.tag())
    }
}

impl FromStr for LevelingArea {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        LevelingArea::ALL
            .into_iter()
            .find(|a| a.tag() == s)
            .ok_or_else(|| format!("unknown leveling area: {}", s))
    }
}

#[derive(Debug, Serialize, Deserialize)]
struct CourseEntry {
    curso: String,
}

/// JSON layout `[{"curso": "..."}, ...]` with ", " and ": " separators,
/// the format downstream consumers of the report already parse.
struct SpacedFormatter;

impl serde_json::ser::Formatter for SpacedFormatter {
    fn begin_array_value<W: ?Sized + io::Write>(&mut self, writer: &mut W, first: bool) -> io::Result<()> {
        if first {
            Ok(())
        } else {
            writer.write_all(b", ")
        }
    }

    fn begin_object_key<W: ?Sized + io::Write>(&mut self, writer: &mut W, first: bool) -> io::Result<()> {
        if first {
            Ok(())
        } else {
            writer.write_all(b", ")
        }
    }

    fn begin_object_value<W: ?Sized + io::Write>(&mut self, writer: &mut W) -> io::Result<()> {
        writer.write_all(b": ")
    }
}

pub fn areas_to_json(areas: &[LevelingArea]) -> serde_json::Result<String> {
    let entries: Vec<CourseEntry> = areas
        .iter()
        .map(|area| CourseEntry { curso: area.tag().to_string() })
        .collect();

    let mut buf = Vec::new();
    let mut serializer = serde_json::Serializer::with_formatter(&mut buf, SpacedFormatter);
    entries.serialize(&mut serializer)?;
    String::from_utf8(buf).map_err(serde_json::Error::custom)
}

pub fn areas_from_json(json: &str) -> Result<Vec<LevelingArea>, String> {
    let entries: Vec<CourseEntry> = serde_json::from_str(json).map_err(|e| e.to_string())?;
    entries.iter().map(|entry| entry.curso.parse()).collect()
}

/// Header row of the results sheet.
pub const OUTPUT_COLUMNS: [&str; 17] = [
    "id",
    "periodo",
    "codigo_estudiante",
    "apellidos",
    "nombres",
    "dni",
    "area",
    "programa",
    "local_examen",
    "MODALIDAD",
    "puntaje",
    "asistio",
    "condicion",
    "requiere_nivelacion",
    "areas_nivelacion",
    "fecha_registro",
    "estado",
];

/// Value of the `estado` column for every generated row
pub const ACTIVE_STATE: i64 = 1;

#[derive(Debug, Clone, PartialEq)]
pub struct ClassifiedRecord {
    pub id: usize,
    pub term: String,
    pub student_code: RawValue,
    pub last_names: RawValue,
    pub first_names: RawValue,
    pub national_id: RawValue,
    pub area: RawValue,
    pub program: RawValue,
    pub exam_site: RawValue,
    pub modality: RawValue,
    pub score: RawValue,
    pub attendance: Attendance,
    pub condition: Condition,
    pub leveling_areas: Vec<LevelingArea>,
    pub registered_at: String,
}

impl ClassifiedRecord {
    pub fn requires_leveling(&self) -> LevelingFlag {
        if self.leveling_areas.is_empty() {
            LevelingFlag::NotRequired
        } else {
            LevelingFlag::Required
        }
    }

    /// Cells in `OUTPUT_COLUMNS` order
    pub fn to_cells(&self) -> serde_json::Result<Vec<RawValue>> {
        // A blank TOTAL cell and a missing TOTAL column both reach here as Empty
        let score = if self.score.is_empty() {
            RawValue::Int(0)
        } else {
            self.score.clone()
        };

        Ok(vec![
            RawValue::Int(self.id as i64),
            RawValue::Text(self.term.clone()),
            self.student_code.clone(),
            self.last_names.clone(),
            self.first_names.clone(),
            self.national_id.clone(),
            self.area.clone(),
            self.program.clone(),
            self.exam_site.clone(),
            self.modality.clone(),
            score,
            RawValue::Text(self.attendance.to_string()),
            RawValue::Text(self.condition.to_string()),
            RawValue::Text(self.requires_leveling().to_string()),
            RawValue::Text(areas_to_json(&self.leveling_areas)?),
            RawValue::Text(self.registered_at.clone()),
            RawValue::Int(ACTIVE_STATE),
        ])
    }

    /// Rebuild a record from a results-sheet row produced by `to_cells`.
    pub fn from_cells(cells: &[RawValue]) -> Result<Self, String> {
        if cells.len() < OUTPUT_COLUMNS.len() {
            return Err(format!(
                "expected {} columns, found {}",
                OUTPUT_COLUMNS.len(),
                cells.len()
            ));
        }

        let id = match &cells[0] {
            RawValue::Int(n) if *n > 0 => *n as usize,
            RawValue::Float(x) if *x >= 1.0 && x.fract() == 0.0 => *x as usize,
            other => return Err(format!("invalid id: {:?}", other)),
        };
        let requires: LevelingFlag = cells[13].to_string().parse()?;
        let leveling_areas = areas_from_json(&cells[14].to_string())?;
        if (requires == LevelingFlag::Required) == leveling_areas.is_empty() {
            return Err(format!("row {}: requiere_nivelacion contradicts areas_nivelacion", id));
        }

        Ok(Self {
            id,
            term: cells[1].to_string(),
            student_code: cells[2].clone(),
            last_names: cells[3].clone(),
            first_names: cells[4].clone(),
            national_id: cells[5].clone(),
            area: cells[6].clone(),
            program: cells[7].clone(),
            exam_site: cells[8].clone(),
            modality: cells[9].clone(),
            score: cells[10].clone(),
            attendance: cells[11].to_string().parse()?,
            condition: cells[12].to_string().parse()?,
            leveling_areas,
            registered_at: cells[15].to_string(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_config_matches_admission_policy() {
        let config = Config::default();
        assert_eq!(config.term_label, "2026-1");
        assert_eq!(config.leveling_threshold, 30.0);
        assert_eq!(config.admission_threshold, 1.0);
        assert!(config.is_social_science_program("Derecho"));
        assert!(config.is_social_science_program("administración de empresas"));
        assert!(config.is_social_science_program("  CONTABILIDAD "));
        assert!(!config.is_social_science_program("Ingeniería Civil"));
        assert!(config.validate().is_ok());
    }

    #[test]
    fn config_round_trips_through_toml_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.toml");
        let path = path.to_str().unwrap();

        let mut config = Config::default();
        config.term_label = "2027-2".to_string();
        config.input_sheet = Some("Hoja1".to_string());
        config.save_to_file(path).unwrap();

        assert_eq!(Config::load_from_file(path).unwrap(), config);
    }

    #[test]
    fn partial_config_falls_back_to_defaults() {
        let config: Config = toml::from_str("leveling_threshold = 40.0").unwrap();
        assert_eq!(config.leveling_threshold, 40.0);
        assert_eq!(config.term_label, "2026-1");
        assert_eq!(config.social_science_programs.len(), 3);
    }

    #[test]
    fn validate_rejects_out_of_range_thresholds() {
        let mut config = Config::default();
        config.leveling_threshold = 130.0;
        assert!(config.validate().is_err());

        let mut config = Config::default();
        config.term_label = "  ".to_string();
        assert!(config.validate().is_err());
    }

    #[test]
    fn headers_match_case_and_whitespace_insensitively() {
        assert_eq!(Column::from_header("TOTAL %"), Some(Column::TotalPct));
        assert_eq!(Column::from_header(" total % "), Some(Column::TotalPct));
        assert_eq!(Column::from_header("Comunicación %"), Some(Column::CommunicationPct));
        assert_eq!(Column::from_header("OBSERVACIONES"), None);
    }

    #[test]
    fn attendance_marker_variants() {
        assert_eq!(Attendance::from_marker(&"NO ASISTIÓ".into()), Attendance::Absent);
        assert_eq!(Attendance::from_marker(&"  no asistió ".into()), Attendance::Absent);
        assert_eq!(Attendance::from_marker(&"No Asistió".into()), Attendance::Absent);
        assert_eq!(Attendance::from_marker(&"Asistió".into()), Attendance::Attended);
        assert_eq!(Attendance::from_marker(&"NO ASISTIO".into()), Attendance::Attended);
        assert_eq!(Attendance::from_marker(&RawValue::Empty), Attendance::Attended);
    }

    #[test]
    fn areas_json_uses_curso_objects() {
        assert_eq!(areas_to_json(&[]).unwrap(), "[]");
        assert_eq!(
            areas_to_json(&[LevelingArea::Mathematics]).unwrap(),
            r#"[{"curso": "MATEMATICA"}]"#
        );
        assert_eq!(
            areas_to_json(&[LevelingArea::Communication, LevelingArea::SocialSciences]).unwrap(),
            r#"[{"curso": "COMUNICACIÓN"}, {"curso": "CIENCIAS SOCIALES"}]"#
        );
    }

    #[test]
    fn areas_json_parses_compact_and_spaced_forms() {
        let areas = areas_from_json(r#"[{"curso":"COMUNICACIÓN"},{"curso":"CIENCIA, TECNOLOGÍA Y AMBIENTE"}]"#).unwrap();
        assert_eq!(areas, vec![LevelingArea::Communication, LevelingArea::ScienceTechnology]);
        assert!(areas_from_json(r#"[{"curso": "FISICA"}]"#).is_err());
    }

    #[test]
    fn blank_score_is_written_as_zero() {
        let record = ClassifiedRecord {
            id: 3,
            term: "2026-1".to_string(),
            student_code: "2026-0003".into(),
            last_names: RawValue::Empty,
            first_names: RawValue::Empty,
            national_id: RawValue::Empty,
            area: RawValue::Empty,
            program: "Medicina".into(),
            exam_site: RawValue::Empty,
            modality: RawValue::Empty,
            score: RawValue::Empty,
            attendance: Attendance::Absent,
            condition: Condition::NotAdmitted,
            leveling_areas: Vec::new(),
            registered_at: String::new(),
        };
        assert_eq!(record.to_cells().unwrap()[10], RawValue::Int(0));

        let blank_text = ClassifiedRecord {
            score: "".into(),
            ..record.clone()
        };
        assert_eq!(blank_text.to_cells().unwrap()[10], RawValue::Int(0));

        let scored = ClassifiedRecord {
            score: RawValue::Float(152.5),
            ..record
        };
        assert_eq!(scored.to_cells().unwrap()[10], RawValue::Float(152.5));
    }

    #[test]
    fn float_display_drops_integral_fraction() {
        assert_eq!(RawValue::Float(72.0).to_string(), "72");
        assert_eq!(RawValue::Float(72.5).to_string(), "72.5");
        assert_eq!(RawValue::Int(12345678).to_string(), "12345678");
        assert_eq!(RawValue::Empty.to_string(), "");
    }
}
