//! Command-line front end: seeds and inspects the local store, records sessions from the
//! synthetic camera, and compares recordings.

use std::{fs, path::PathBuf, sync::Arc};

use anyhow::{anyhow, bail, Context, Result};
use chrono::Utc;
use clap::{Args, Parser, Subcommand, ValueEnum};
use log::{info, warn};
use rand::{rngs::StdRng, SeedableRng};
use tokio::sync::mpsc;

use crate::{
    analysis::{
        compare, default_selection, project_chart, resolve_pair, session_label, ComparisonOutcome,
        ComparisonTarget, MapeDenominator, StatsConfig,
    },
    capture::{
        synthetic::{MotionProfile, SyntheticCamera, SyntheticPoseEstimator},
        CaptureConfig, CaptureController, CaptureOutcome, CaptureRequest, CaptureStatus,
    },
    db::{Database, DoctorInput, PatientInput, PresetInput},
    pose::{AngleSeries, Joint},
    seed::seed_demo_data,
    settings::{
        data_dir_from_env, AnalysisSettings, SettingsStore, DATABASE_FILE, SETTINGS_FILE,
    },
};

/// Rehabilitation exercise tracker
#[derive(Parser, Debug)]
#[command(name = "rehabtrack")]
#[command(author, version, about = "Joint-angle capture and session comparison for rehab exercises")]
#[command(propagate_version = true)]
pub struct Cli {
    /// Data directory holding the database and settings [env: REHABTRACK_DATA_DIR]
    #[arg(long, global = true)]
    pub data_dir: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Load the demo doctors, patients, presets and sessions
    Seed {
        /// Wipe existing data first
        #[arg(long)]
        reset: bool,

        /// Seed for the generated angle series
        #[arg(long, default_value = "42")]
        rng_seed: u64,
    },

    /// Manage exercise presets
    #[command(subcommand)]
    Presets(PresetsCommand),

    /// Manage doctors
    #[command(subcommand)]
    Doctors(DoctorsCommand),

    /// Manage patients
    #[command(subcommand)]
    Patients(PatientsCommand),

    /// Inspect recorded sessions
    #[command(subcommand)]
    Sessions(SessionsCommand),

    /// Record a session from the synthetic camera
    Record(RecordArgs),

    /// Compare two sessions, or a session against its preset benchmark
    Compare(CompareArgs),

    /// Print the chart series of one joint as JSON
    Chart {
        #[command(flatten)]
        selection: SelectionArgs,

        /// Joint to plot
        #[arg(short, long, default_value = "leftElbow")]
        joint: Joint,
    },

    /// Show or change settings
    #[command(subcommand)]
    Settings(SettingsCommand),
}

#[derive(Subcommand, Debug)]
pub enum PresetsCommand {
    /// List all presets
    List,

    /// Show one preset
    Show { id: String },

    /// Create a preset
    Create(PresetArgs),

    /// Replace a preset's fields
    Update {
        id: String,

        #[command(flatten)]
        preset: PresetArgs,
    },

    /// Delete a preset
    Delete { id: String },
}

#[derive(Args, Debug)]
pub struct PresetArgs {
    #[arg(short, long)]
    pub name: String,

    #[arg(long, default_value = "")]
    pub description: String,

    /// Recording duration in seconds
    #[arg(long)]
    pub duration: u32,

    /// JSON file with the benchmark angle series
    #[arg(long)]
    pub benchmark: Option<PathBuf>,
}

#[derive(Subcommand, Debug)]
pub enum DoctorsCommand {
    /// List all doctors
    List,

    /// Show one doctor and their patients
    Show { id: String },

    /// Register a doctor
    Create(DoctorArgs),

    /// Replace a doctor's fields
    Update {
        id: String,

        #[command(flatten)]
        doctor: DoctorArgs,
    },

    /// Delete a doctor without patients or sessions
    Delete { id: String },
}

#[derive(Args, Debug)]
pub struct DoctorArgs {
    #[arg(short, long)]
    pub name: String,

    #[arg(short, long)]
    pub email: String,
}

#[derive(Subcommand, Debug)]
pub enum PatientsCommand {
    /// List patients
    List {
        /// Only patients of this doctor
        #[arg(short, long)]
        doctor: Option<String>,
    },

    /// Show one patient
    Show { id: String },

    /// Register a patient
    Create(PatientArgs),

    /// Replace a patient's fields
    Update {
        id: String,

        #[command(flatten)]
        patient: PatientArgs,
    },

    /// Delete a patient and their sessions
    Delete { id: String },
}

#[derive(Args, Debug)]
pub struct PatientArgs {
    #[arg(short, long)]
    pub name: String,

    #[arg(short, long)]
    pub email: String,

    /// Responsible doctor
    #[arg(short, long)]
    pub doctor: String,
}

#[derive(Subcommand, Debug)]
pub enum SessionsCommand {
    /// Sessions of one patient, newest first
    List {
        #[arg(short, long)]
        patient: String,
    },

    /// Delete a session
    Delete { id: String },
}

#[derive(Args, Debug)]
pub struct RecordArgs {
    #[arg(short, long)]
    pub patient: String,

    /// Preset to record against
    #[arg(long)]
    pub preset: String,

    /// Defaults to the patient's doctor
    #[arg(short, long)]
    pub doctor: Option<String>,

    /// Override the preset duration, in seconds
    #[arg(long)]
    pub duration: Option<u32>,

    /// Seed for the synthetic pose model
    #[arg(long, default_value = "1")]
    pub rng_seed: u64,

    /// Noise width of the synthetic pose model, degrees
    #[arg(long, default_value = "4.0")]
    pub noise: f64,
}

#[derive(Args, Debug)]
pub struct SelectionArgs {
    #[arg(short, long)]
    pub patient: String,

    /// Primary session (defaults to the newest)
    #[arg(long)]
    pub primary: Option<String>,

    /// Session to compare with (defaults to the second newest)
    #[arg(long, conflicts_with = "benchmark")]
    pub against: Option<String>,

    /// Compare with the benchmark of the primary session's preset
    #[arg(long)]
    pub benchmark: bool,
}

#[derive(Args, Debug)]
pub struct CompareArgs {
    #[command(flatten)]
    pub selection: SelectionArgs,

    /// Print the report as JSON
    #[arg(long)]
    pub json: bool,

    /// Override the configured MAPE denominator
    #[arg(long, value_enum)]
    pub mape_denominator: Option<MapeDenominatorArg>,
}

#[derive(ValueEnum, Clone, Copy, Debug)]
pub enum MapeDenominatorArg {
    AllPairs,
    NonZeroReference,
}

impl From<MapeDenominatorArg> for MapeDenominator {
    fn from(val: MapeDenominatorArg) -> Self {
        match val {
            MapeDenominatorArg::AllPairs => MapeDenominator::AllPairs,
            MapeDenominatorArg::NonZeroReference => MapeDenominator::NonZeroReference,
        }
    }
}

#[derive(Subcommand, Debug)]
pub enum SettingsCommand {
    /// Print the current settings
    Show,

    /// Change settings; omitted values are kept
    Set {
        #[arg(long)]
        frame_interval_ms: Option<u64>,

        #[arg(long)]
        completion_delay_ms: Option<u64>,

        #[arg(long)]
        min_keypoint_score: Option<f64>,

        #[arg(long, value_enum)]
        mape_denominator: Option<MapeDenominatorArg>,
    },
}

struct Workspace {
    db: Database,
    settings: SettingsStore,
}

fn open(data_dir: Option<PathBuf>) -> Result<Workspace> {
    let data_dir = data_dir.unwrap_or_else(data_dir_from_env);
    fs::create_dir_all(&data_dir)
        .with_context(|| format!("failed to create data directory {}", data_dir.display()))?;
    Ok(Workspace {
        db: Database::new(data_dir.join(DATABASE_FILE))?,
        settings: SettingsStore::new(data_dir.join(SETTINGS_FILE))?,
    })
}

pub async fn execute(cli: Cli) -> Result<()> {
    let ctx = open(cli.data_dir)?;

    match cli.command {
        Commands::Seed { reset, rng_seed } => {
            let mut rng = StdRng::seed_from_u64(rng_seed);
            let report = seed_demo_data(&ctx.db, &mut rng, reset, Utc::now()).await?;
            if report.skipped {
                println!("Data already present; rerun with --reset to replace it.");
            } else {
                println!(
                    "Seeded {} doctors, {} patients, {} presets, {} sessions.",
                    report.doctors, report.patients, report.presets, report.sessions
                );
            }
        }
        Commands::Presets(command) => presets(&ctx.db, command).await?,
        Commands::Doctors(command) => doctors(&ctx.db, command).await?,
        Commands::Patients(command) => patients(&ctx.db, command).await?,
        Commands::Sessions(SessionsCommand::List { patient }) => {
            for session in ctx.db.list_sessions_for_patient(&patient).await? {
                println!(
                    "{:<38} {}  {:>6} frames  preset {}",
                    session.id,
                    session.recorded_at.format("%Y-%m-%d %H:%M"),
                    session.frame_count(),
                    session.exercise_preset_id.as_deref().unwrap_or("-")
                );
            }
        }
        Commands::Sessions(SessionsCommand::Delete { id }) => {
            if !ctx.db.delete_session(&id).await? {
                bail!("session '{id}' not found");
            }
            println!("Deleted session {id}");
        }
        Commands::Record(args) => record(&ctx, args).await?,
        Commands::Compare(args) => {
            let mut config = StatsConfig {
                mape_denominator: ctx.settings.analysis().mape_denominator,
            };
            if let Some(denominator) = args.mape_denominator {
                config.mape_denominator = denominator.into();
            }

            let Some((primary, target)) = selection(&ctx.db, &args.selection).await? else {
                println!("No sessions recorded for patient {}", args.selection.patient);
                return Ok(());
            };
            match compare(&ctx.db, &args.selection.patient, &primary, &target, &config).await? {
                ComparisonOutcome::Report(report) if args.json => {
                    println!("{}", serde_json::to_string_pretty(&report)?);
                }
                ComparisonOutcome::Report(report) => print!("{}", report.render_table()),
                ComparisonOutcome::Unavailable(reason) => println!("No comparison: {reason}"),
            }
        }
        Commands::Chart { selection: args, joint } => {
            let Some((primary, target)) = selection(&ctx.db, &args).await? else {
                println!("No sessions recorded for patient {}", args.patient);
                return Ok(());
            };
            match resolve_pair(&ctx.db, &args.patient, &primary, &target).await? {
                Ok((primary, secondary)) => {
                    let chart = project_chart(&primary, &secondary, joint);
                    println!("{}", serde_json::to_string_pretty(&chart)?);
                }
                Err(reason) => println!("No comparison: {reason}"),
            }
        }
        Commands::Settings(command) => settings_command(&ctx.settings, command)?,
    }

    Ok(())
}

/// Fills in the dashboard defaults for whatever the user left out.
async fn selection(
    db: &Database,
    args: &SelectionArgs,
) -> Result<Option<(String, ComparisonTarget)>> {
    let sessions = db.list_sessions_for_patient(&args.patient).await?;
    let Some((newest, second)) = default_selection(&sessions) else {
        return Ok(None);
    };

    let primary = args.primary.clone().unwrap_or(newest);
    let target = if args.benchmark {
        ComparisonTarget::Benchmark
    } else {
        ComparisonTarget::Session(args.against.clone().unwrap_or(second))
    };
    Ok(Some((primary, target)))
}

async fn presets(db: &Database, command: PresetsCommand) -> Result<()> {
    match command {
        PresetsCommand::List => {
            for preset in db.list_presets().await? {
                println!(
                    "{:<38} {:<16} {:>4}s  {:>5} benchmark frames",
                    preset.id,
                    preset.name,
                    preset.duration_secs,
                    preset.benchmark.frame_count()
                );
            }
        }
        PresetsCommand::Show { id } => {
            let preset = db
                .get_preset(&id)
                .await?
                .ok_or_else(|| anyhow!("exercise preset '{id}' not found"))?;
            println!("{} ({})", preset.name, preset.id);
            println!("{}", preset.description);
            println!("Duration: {}s", preset.duration_secs);
            for joint in Joint::ALL {
                match preset.benchmark.range(joint) {
                    Some((min, max)) => {
                        println!("  {:<12} {:>6.1} .. {:>6.1}", joint.display_name(), min, max)
                    }
                    None => println!("  {:<12} no data", joint.display_name()),
                }
            }
        }
        PresetsCommand::Create(args) => {
            let preset = db.create_preset(preset_input(args)?).await?;
            println!("Created preset {} ({})", preset.name, preset.id);
        }
        PresetsCommand::Update { id, preset } => {
            let preset = db.update_preset(&id, preset_input(preset)?).await?;
            println!("Updated preset {} ({})", preset.name, preset.id);
        }
        PresetsCommand::Delete { id } => {
            db.delete_preset(&id).await?;
            println!("Deleted preset {id}");
        }
    }
    Ok(())
}

async fn doctors(db: &Database, command: DoctorsCommand) -> Result<()> {
    match command {
        DoctorsCommand::List => {
            for doctor in db.list_doctors().await? {
                println!("{:<38} {:<20} {}", doctor.id, doctor.name, doctor.email);
            }
        }
        DoctorsCommand::Show { id } => {
            let doctor = db
                .get_doctor(&id)
                .await?
                .ok_or_else(|| anyhow!("doctor '{id}' not found"))?;
            println!("{} <{}> ({})", doctor.name, doctor.email, doctor.id);
            for patient in db.list_patients(Some(&doctor.id)).await? {
                println!("  {:<38} {}", patient.id, patient.name);
            }
        }
        DoctorsCommand::Create(args) => {
            let doctor = db.create_doctor(doctor_input(args)).await?;
            println!("Created doctor {} ({})", doctor.name, doctor.id);
        }
        DoctorsCommand::Update { id, doctor } => {
            let doctor = db.update_doctor(&id, doctor_input(doctor)).await?;
            println!("Updated doctor {} ({})", doctor.name, doctor.id);
        }
        DoctorsCommand::Delete { id } => {
            db.delete_doctor(&id).await?;
            println!("Deleted doctor {id}");
        }
    }
    Ok(())
}

fn doctor_input(args: DoctorArgs) -> DoctorInput {
    DoctorInput {
        name: args.name,
        email: args.email,
    }
}

async fn patients(db: &Database, command: PatientsCommand) -> Result<()> {
    match command {
        PatientsCommand::List { doctor } => {
            for patient in db.list_patients(doctor.as_deref()).await? {
                println!(
                    "{:<38} {:<20} {:<24} {}",
                    patient.id, patient.name, patient.email, patient.doctor_id
                );
            }
        }
        PatientsCommand::Show { id } => {
            let patient = db
                .get_patient(&id)
                .await?
                .ok_or_else(|| anyhow!("patient '{id}' not found"))?;
            let sessions = db.list_sessions_for_patient(&patient.id).await?;
            println!("{} <{}> ({})", patient.name, patient.email, patient.id);
            println!("Doctor: {}", patient.doctor_id);
            println!("Sessions: {}", sessions.len());
        }
        PatientsCommand::Create(args) => {
            let input = patient_input(db, args).await?;
            let patient = db.create_patient(input).await?;
            println!("Created patient {} ({})", patient.name, patient.id);
        }
        PatientsCommand::Update { id, patient } => {
            let input = patient_input(db, patient).await?;
            let patient = db.update_patient(&id, input).await?;
            println!("Updated patient {} ({})", patient.name, patient.id);
        }
        PatientsCommand::Delete { id } => {
            let sessions = db.delete_patient(&id).await?;
            println!("Deleted patient {id} and {sessions} sessions");
        }
    }
    Ok(())
}

async fn patient_input(db: &Database, args: PatientArgs) -> Result<PatientInput> {
    if db.get_doctor(&args.doctor).await?.is_none() {
        bail!("doctor '{}' not found", args.doctor);
    }
    Ok(PatientInput {
        name: args.name,
        email: args.email,
        doctor_id: args.doctor,
    })
}

fn preset_input(args: PresetArgs) -> Result<PresetInput> {
    let benchmark = match &args.benchmark {
        Some(path) => {
            let contents = fs::read_to_string(path)
                .with_context(|| format!("failed to read benchmark {}", path.display()))?;
            serde_json::from_str::<AngleSeries>(&contents)
                .with_context(|| format!("invalid benchmark series in {}", path.display()))?
        }
        None => AngleSeries::new(),
    };
    Ok(PresetInput {
        name: args.name,
        description: args.description,
        duration_secs: args.duration,
        benchmark,
    })
}

/// Save attempts before the recording is given up on.
const SAVE_ATTEMPTS: u32 = 3;

async fn record(ctx: &Workspace, args: RecordArgs) -> Result<()> {
    let patient = ctx
        .db
        .get_patient(&args.patient)
        .await?
        .ok_or_else(|| anyhow!("patient '{}' not found", args.patient))?;
    let preset = ctx
        .db
        .get_preset(&args.preset)
        .await?
        .ok_or_else(|| anyhow!("exercise preset '{}' not found", args.preset))?;

    let doctor_id = args.doctor.unwrap_or_else(|| patient.doctor_id.clone());
    if ctx.db.get_doctor(&doctor_id).await?.is_none() {
        bail!("doctor '{doctor_id}' not found");
    }
    let mut request = CaptureRequest::for_preset(patient.id.clone(), doctor_id, &preset);
    if let Some(duration) = args.duration {
        request.duration_secs = duration;
    }

    let profile = MotionProfile::from_benchmark(&preset.benchmark, args.noise);
    let controller = CaptureController::spawn(
        SyntheticCamera::new(640, 480),
        SyntheticPoseEstimator::new(profile, args.rng_seed),
        Arc::new(ctx.db.clone()),
        request,
        CaptureConfig::from(&ctx.settings.capture()),
    );

    controller.wait_until_ready().await?;
    controller.start().await?;
    println!(
        "Recording {} for {}: {}s (Ctrl-C stops early, again discards)",
        preset.name, patient.name, controller.snapshot().remaining_secs
    );

    let mut updates = controller.subscribe();
    let progress = tokio::spawn(async move {
        let mut last = None;
        while updates.changed().await.is_ok() {
            let snapshot = updates.borrow_and_update().clone();
            if snapshot.status == CaptureStatus::Recording && last != Some(snapshot.remaining_secs)
            {
                last = Some(snapshot.remaining_secs);
                info!(
                    "{}s left, {} frames",
                    snapshot.remaining_secs, snapshot.frames_recorded
                );
            }
        }
    });

    let (interrupt_tx, interrupt_rx) = mpsc::channel(4);
    let listener = tokio::spawn(async move {
        while tokio::signal::ctrl_c().await.is_ok() {
            if interrupt_tx.send(()).await.is_err() {
                break;
            }
        }
    });

    let outcome = supervise(&controller, interrupt_rx).await;
    listener.abort();
    progress.abort();

    match outcome? {
        CaptureOutcome::Saved(session) => println!(
            "Saved {} ({} frames, {} skipped) as {}",
            session_label(&session),
            session.frame_count(),
            controller.snapshot().frames_skipped,
            session.id
        ),
        CaptureOutcome::Cancelled => println!("Recording cancelled"),
        CaptureOutcome::Failed(reason) => bail!("capture failed: {reason}"),
        CaptureOutcome::Abandoned(payload) => {
            let lost = payload.as_ref().map_or(0, |session| session.angles.frame_count());
            match controller.snapshot().save_error {
                Some(reason) => bail!("session not saved, {lost} frames discarded: {reason}"),
                None => bail!("capture interrupted, {lost} frames discarded"),
            }
        }
    }
    Ok(())
}

/// Waits for the capture loop to end while reacting to interrupts and failed saves.
///
/// The first interrupt during a recording stops it early. Any later interrupt, or one arriving
/// after the recording stopped, tears the loop down. A failed save is retried until
/// `SAVE_ATTEMPTS` saves have failed, then the loop is torn down and the unsaved recording comes
/// back as `Abandoned`.
async fn supervise(
    controller: &CaptureController,
    mut interrupts: mpsc::Receiver<()>,
) -> Result<CaptureOutcome> {
    let mut updates = controller.subscribe();
    let mut interrupted = false;
    let mut save_failed = false;

    let finished = controller.wait_finished();
    tokio::pin!(finished);

    loop {
        tokio::select! {
            outcome = &mut finished => return outcome,
            Some(()) = interrupts.recv() => {
                if interrupted || controller.snapshot().status != CaptureStatus::Recording {
                    println!("Interrupted; discarding capture");
                    controller.request_shutdown();
                    continue;
                }
                interrupted = true;
                match controller.stop().await {
                    Ok(true) => println!("Stopped early; saving..."),
                    Ok(false) => {}
                    Err(err) => warn!("stop ignored: {err}"),
                }
            }
            Ok(()) = updates.changed(), if !save_failed => {
                let Some(reason) = updates.borrow_and_update().save_error.clone() else {
                    continue;
                };
                save_failed = true;
                retry_failed_save(controller, reason).await;
            }
        }
    }
}

/// Either a retry succeeds and the loop finishes, or the loop is told to shut down.
async fn retry_failed_save(controller: &CaptureController, first_error: String) {
    eprintln!("Saving failed (1/{SAVE_ATTEMPTS}): {first_error}");
    for attempt in 2..=SAVE_ATTEMPTS {
        match controller.retry_save().await {
            Ok(()) => return,
            Err(err) => eprintln!("Saving failed ({attempt}/{SAVE_ATTEMPTS}): {err:#}"),
        }
    }
    controller.request_shutdown();
}

fn settings_command(store: &SettingsStore, command: SettingsCommand) -> Result<()> {
    match command {
        SettingsCommand::Show => {}
        SettingsCommand::Set {
            frame_interval_ms,
            completion_delay_ms,
            min_keypoint_score,
            mape_denominator,
        } => {
            let mut capture = store.capture();
            if let Some(value) = frame_interval_ms {
                capture.frame_interval_ms = value;
            }
            if let Some(value) = completion_delay_ms {
                capture.completion_delay_ms = value;
            }
            if let Some(value) = min_keypoint_score {
                capture.min_keypoint_score = value;
            }
            store.update_capture(capture)?;

            if let Some(denominator) = mape_denominator {
                store.update_analysis(AnalysisSettings {
                    mape_denominator: denominator.into(),
                })?;
            }
        }
    }

    println!("Settings file: {}", store.path().display());
    println!("{}", serde_json::to_string_pretty(&store.capture())?);
    println!("{}", serde_json::to_string_pretty(&store.analysis())?);
    Ok(())
}

#[cfg(test)]
mod tests {
    use std::{
        sync::atomic::{AtomicUsize, Ordering},
        time::Duration,
    };

    use super::*;
    use crate::db::{ExercisePreset, NewSession, Session, SessionStore};

    /// Rejects the first `failures` saves, like an insert hitting a foreign-key violation.
    struct FlakyStore {
        failures: usize,
        attempts: AtomicUsize,
    }

    impl FlakyStore {
        fn new(failures: usize) -> Arc<Self> {
            Arc::new(Self {
                failures,
                attempts: AtomicUsize::new(0),
            })
        }

        fn attempts(&self) -> usize {
            self.attempts.load(Ordering::SeqCst)
        }
    }

    impl SessionStore for FlakyStore {
        async fn list_sessions_for_patient(&self, _patient_id: &str) -> Result<Vec<Session>> {
            Ok(Vec::new())
        }

        async fn get_session(&self, _session_id: &str) -> Result<Option<Session>> {
            Ok(None)
        }

        async fn save_session(&self, session: NewSession) -> Result<Session> {
            let attempt = self.attempts.fetch_add(1, Ordering::SeqCst);
            if attempt < self.failures {
                bail!("FOREIGN KEY constraint failed");
            }
            Ok(session.into_session("saved".into()))
        }

        async fn list_presets(&self) -> Result<Vec<ExercisePreset>> {
            Ok(Vec::new())
        }
    }

    async fn recording(store: &Arc<FlakyStore>, duration_secs: u32) -> CaptureController {
        let controller = CaptureController::spawn(
            SyntheticCamera::new(320, 240),
            SyntheticPoseEstimator::new(MotionProfile::arm_lifts(), 5),
            Arc::clone(store),
            CaptureRequest {
                patient_id: "pat1".into(),
                doctor_id: "ghost".into(),
                preset_id: Some("preset1".into()),
                duration_secs,
            },
            CaptureConfig::default(),
        );
        controller.wait_until_ready().await.unwrap();
        controller.start().await.unwrap();
        controller
    }

    #[tokio::test(start_paused = true)]
    async fn test_record_gives_up_when_saves_keep_failing() {
        let store = FlakyStore::new(usize::MAX);
        let controller = recording(&store, 1).await;
        let (_interrupt_tx, interrupts) = mpsc::channel(1);

        let outcome = supervise(&controller, interrupts).await.unwrap();
        let CaptureOutcome::Abandoned(Some(payload)) = outcome else {
            panic!("expected the unsaved recording back, got {outcome:?}");
        };
        assert!(payload.angles.frame_count() > 0);
        assert_eq!(store.attempts(), SAVE_ATTEMPTS as usize);
        assert_eq!(
            controller.snapshot().save_error.as_deref(),
            Some("FOREIGN KEY constraint failed")
        );
    }

    #[tokio::test(start_paused = true)]
    async fn test_record_retries_a_failed_save() {
        let store = FlakyStore::new(1);
        let controller = recording(&store, 1).await;
        let (_interrupt_tx, interrupts) = mpsc::channel(1);

        let outcome = supervise(&controller, interrupts).await.unwrap();
        assert!(matches!(outcome, CaptureOutcome::Saved(_)));
        assert_eq!(store.attempts(), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn test_second_interrupt_discards_capture() {
        let store = FlakyStore::new(0);
        let controller = recording(&store, 30).await;
        tokio::time::sleep(Duration::from_millis(300)).await;

        let (interrupt_tx, interrupts) = mpsc::channel(2);
        interrupt_tx.send(()).await.unwrap();
        interrupt_tx.send(()).await.unwrap();

        let outcome = supervise(&controller, interrupts).await.unwrap();
        let CaptureOutcome::Abandoned(Some(payload)) = outcome else {
            panic!("expected the unsaved recording back, got {outcome:?}");
        };
        assert!(payload.angles.frame_count() > 0);
        assert_eq!(store.attempts(), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_interrupt_stops_and_saves() {
        let store = FlakyStore::new(0);
        let controller = recording(&store, 30).await;
        tokio::time::sleep(Duration::from_millis(300)).await;

        let (interrupt_tx, interrupts) = mpsc::channel(1);
        interrupt_tx.send(()).await.unwrap();

        let outcome = supervise(&controller, interrupts).await.unwrap();
        assert!(matches!(outcome, CaptureOutcome::Saved(_)));
        assert_eq!(store.attempts(), 1);
    }

    #[test]
    fn test_people_commands_parse() {
        let cli = Cli::try_parse_from([
            "rehabtrack",
            "patients",
            "update",
            "pat1",
            "-n",
            "John Doe",
            "-e",
            "j.doe@email.com",
            "-d",
            "doc2",
        ])
        .unwrap();
        let Commands::Patients(PatientsCommand::Update { id, patient }) = cli.command else {
            panic!("expected patients update");
        };
        assert_eq!(id, "pat1");
        assert_eq!(patient.doctor, "doc2");

        let cli = Cli::try_parse_from(["rehabtrack", "doctors", "delete", "doc1"]).unwrap();
        assert!(matches!(
            cli.command,
            Commands::Doctors(DoctorsCommand::Delete { .. })
        ));
        assert!(Cli::try_parse_from(["rehabtrack", "patients", "create", "-n", "X"]).is_err());
    }

    #[tokio::test]
    async fn test_patient_requires_known_doctor() {
        let db = Database::in_memory().unwrap();
        let args = PatientArgs {
            name: "John Doe".into(),
            email: "j.doe@email.com".into(),
            doctor: "ghost".into(),
        };
        let err = patient_input(&db, args).await.unwrap_err();
        assert!(err.to_string().contains("doctor 'ghost' not found"));
    }

    #[test]
    fn test_cli_is_well_formed() {
        use clap::CommandFactory;
        Cli::command().debug_assert();
    }

    #[test]
    fn test_compare_arguments() {
        let cli = Cli::try_parse_from([
            "rehabtrack",
            "compare",
            "--patient",
            "pat1",
            "--benchmark",
            "--mape-denominator",
            "non-zero-reference",
        ])
        .unwrap();
        let Commands::Compare(args) = cli.command else {
            panic!("expected compare");
        };
        assert!(args.selection.benchmark);
        assert!(args.selection.primary.is_none());
        assert!(matches!(
            args.mape_denominator,
            Some(MapeDenominatorArg::NonZeroReference)
        ));

        assert!(Cli::try_parse_from([
            "rehabtrack",
            "compare",
            "--patient",
            "pat1",
            "--benchmark",
            "--against",
            "sess1",
        ])
        .is_err());
    }

    #[test]
    fn test_chart_joint_parses() {
        let cli =
            Cli::try_parse_from(["rehabtrack", "chart", "-p", "pat1", "--joint", "rightKnee"])
                .unwrap();
        let Commands::Chart { joint, .. } = cli.command else {
            panic!("expected chart");
        };
        assert_eq!(joint, Joint::RightKnee);
    }

    #[tokio::test]
    async fn test_selection_defaults() {
        let db = Database::in_memory().unwrap();
        let mut rng = StdRng::seed_from_u64(3);
        seed_demo_data(&db, &mut rng, false, Utc::now()).await.unwrap();

        let args = SelectionArgs {
            patient: "pat1".into(),
            primary: None,
            against: None,
            benchmark: false,
        };
        assert_eq!(
            selection(&db, &args).await.unwrap(),
            Some(("sess2".into(), ComparisonTarget::Session("sess1".into())))
        );

        let args = SelectionArgs {
            patient: "pat3".into(),
            primary: None,
            against: None,
            benchmark: true,
        };
        assert_eq!(selection(&db, &args).await.unwrap(), None);
    }
}
