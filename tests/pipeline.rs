// tests/pipeline.rs

//! End-to-end tests for the bundle pipeline

mod common;

use agent_bundle::manifest::{
    AGENT_CLASS, CAN_REDEFINE_CLASSES, CAN_RETRANSFORM_CLASSES, IMPLEMENTATION_VENDOR,
    IMPLEMENTATION_VERSION, MAIN_CLASS, PREMAIN_CLASS,
};
use agent_bundle::relocate::classfile;
use agent_bundle::{
    AttributeValue, CallbackProgress, Error, ManifestAttributes, Pipeline, ProgressEvent,
    SharedContract, SilentProgress, Stage, verify_bundle, verify_twins,
};
use common::{BundleProject, class_file, input_manifest, read_jar, text};
use std::sync::{Arc, Mutex};

const RELOCATE_OKHTTP: &str = r#"
[[relocate]]
pattern = "okhttp3"
replacement = "com.splunk.shaded.okhttp3"
"#;

const INPUTS: &str = r#"
[inputs]
bootstrap = ["bootstrap"]
agent_libs = ["agent"]
upstream = ["upstream/opentelemetry-javaagent.jar"]
"#;

/// Bootstrap, three agent-lib jars (one of them a shared library) and an upstream agent
fn standard_project() -> BundleProject {
    let project = BundleProject::new();

    project.jar(
        "bootstrap/bootstrap.jar",
        &[
            input_manifest(),
            (
                "com/splunk/opentelemetry/bootstrap/Config.class",
                class_file("com/splunk/opentelemetry/bootstrap/Config", &[]),
            ),
            ("org/slf4j/Logger.class", class_file("org/slf4j/Logger", &[])),
        ],
    );

    project.jar(
        "agent/instrumentation-a.jar",
        &[
            input_manifest(),
            (
                "com/splunk/instr/a/AInstrumentation.class",
                class_file(
                    "com/splunk/instr/a/AInstrumentation",
                    &["Lokhttp3/OkHttpClient;", "org/slf4j/Logger", "okhttp3.OkHttpClient"],
                ),
            ),
            ("LICENSE", text("Apache License 2.0")),
            ("META-INF/INDEX.LIST", text("JarIndex-Version: 1.0")),
            ("META-INF/A.SF", text("Signature-Version: 1.0")),
        ],
    );

    project.jar(
        "agent/okhttp-4.9.3.jar",
        &[
            (
                "okhttp3/OkHttpClient.class",
                class_file("okhttp3/OkHttpClient", &["okhttp3/Call"]),
            ),
            ("okhttp3/internal/publicsuffix/publicsuffixes.gz", vec![0x1f, 0x8b, 8, 0]),
            ("module-info.class", class_file("module-info", &[])),
        ],
    );

    project.jar(
        "agent/slf4j-api-1.7.36.jar",
        &[("org/slf4j/Logger.class", class_file("org/slf4j/Logger", &["agent-copy"]))],
    );

    project.jar(
        "upstream/opentelemetry-javaagent.jar",
        &[
            input_manifest(),
            (
                "io/opentelemetry/javaagent/OpenTelemetryAgent.class",
                class_file("io/opentelemetry/javaagent/OpenTelemetryAgent", &[]),
            ),
            (
                "inst/io/opentelemetry/javaagent/tooling/Tooling.classdata",
                class_file("io/opentelemetry/javaagent/tooling/Tooling", &[]),
            ),
        ],
    );

    project
}

fn standard_pipeline(project: &BundleProject) -> Pipeline {
    let config = project.config(&format!("{}\n{}", INPUTS, RELOCATE_OKHTTP));
    Pipeline::new(config).unwrap()
}

#[test]
fn test_build_writes_union_of_transformed_entries() {
    let project = standard_project();
    let report = standard_pipeline(&project).run(&SilentProgress::new()).unwrap();

    assert_eq!(report.classifier_jar, project.classifier_jar());
    assert_eq!(report.primary_jar, project.primary_jar());

    let bundle = read_jar(&project.classifier_jar());
    let paths: Vec<&str> = bundle.paths().collect();
    assert_eq!(
        paths,
        vec![
            "META-INF/MANIFEST.MF",
            "inst/com/splunk/instr/a/AInstrumentation.classdata",
            "inst/LICENSE.renamed",
            "inst/com/splunk/shaded/okhttp3/OkHttpClient.classdata",
            "inst/com/splunk/shaded/okhttp3/internal/publicsuffix/publicsuffixes.gz",
            "com/splunk/opentelemetry/bootstrap/Config.class",
            "org/slf4j/Logger.class",
            "io/opentelemetry/javaagent/OpenTelemetryAgent.class",
            "inst/io/opentelemetry/javaagent/tooling/Tooling.classdata",
        ]
    );

    // 10 non-descriptor input entries outside the shared jar, 2 excluded, plus the manifest
    assert_eq!(report.entries, 9);
    assert_eq!(report.stats.isolation_excluded, 2);
    assert_eq!(report.stats.shared_jars_dropped, vec!["slf4j-api-1.7.36.jar"]);
    assert_eq!(report.stats.agent_lib_jars, 2);
}

#[test]
fn test_isolation_is_prefix_total() {
    let project = standard_project();
    standard_pipeline(&project).run(&SilentProgress::new()).unwrap();

    let bundle = read_jar(&project.classifier_jar());
    let isolated: Vec<&str> = bundle
        .paths()
        .filter(|p| p.starts_with("inst/") && !p.contains("javaagent/tooling"))
        .collect();
    assert_eq!(isolated.len(), 4);
    assert!(bundle.paths().filter(|p| p.starts_with("inst/")).all(|p| !p.ends_with(".class")));
    assert!(!bundle.paths().any(|p| p.starts_with("com/splunk/instr/")));
    assert!(!bundle.paths().any(|p| p.starts_with("okhttp3/")));
}

#[test]
fn test_relocated_references_inside_isolated_classes() {
    let project = standard_project();
    standard_pipeline(&project).run(&SilentProgress::new()).unwrap();

    let bundle = read_jar(&project.classifier_jar());
    let entry = bundle
        .get("inst/com/splunk/instr/a/AInstrumentation.classdata")
        .unwrap();
    let constants = classfile::utf8_constants(&entry.content).unwrap();
    assert!(constants.contains(&"Lcom/splunk/shaded/okhttp3/OkHttpClient;".to_string()));
    assert!(constants.contains(&"com.splunk.shaded.okhttp3.OkHttpClient".to_string()));
    // Shared names are resolved against the bootstrap tier, unrenamed
    assert!(constants.contains(&"org/slf4j/Logger".to_string()));

    let okhttp = bundle
        .get("inst/com/splunk/shaded/okhttp3/OkHttpClient.classdata")
        .unwrap();
    assert_eq!(
        classfile::class_name(&okhttp.content).unwrap(),
        "com/splunk/shaded/okhttp3/OkHttpClient"
    );
}

#[test]
fn test_shared_libraries_never_isolated() {
    let project = standard_project();
    standard_pipeline(&project).run(&SilentProgress::new()).unwrap();

    let bundle = read_jar(&project.classifier_jar());
    let shared = SharedContract::default();
    for path in bundle.paths() {
        if let Some(rest) = path.strip_prefix("inst/") {
            assert!(!shared.covers_internal_name(rest), "{} is isolated", path);
        }
    }

    // The bootstrap copy is byte-identical to its input
    let logger = bundle.get("org/slf4j/Logger.class").unwrap();
    assert_eq!(logger.content, class_file("org/slf4j/Logger", &[]));
}

#[test]
fn test_stray_shared_classes_are_dropped_from_agent_libs() {
    let project = standard_project();
    project.jar(
        "agent/fat-instrumentation.jar",
        &[
            ("com/splunk/fat/Fat.class", class_file("com/splunk/fat/Fat", &[])),
            (
                "io/opentelemetry/api/GlobalOpenTelemetry.class",
                class_file("io/opentelemetry/api/GlobalOpenTelemetry", &[]),
            ),
        ],
    );

    let report = standard_pipeline(&project).run(&SilentProgress::new()).unwrap();
    assert_eq!(report.stats.stray_shared_entries, 1);

    let bundle = read_jar(&project.classifier_jar());
    assert!(bundle.contains("inst/com/splunk/fat/Fat.classdata"));
    assert!(!bundle.paths().any(|p| p.contains("GlobalOpenTelemetry")));
}

#[test]
fn test_duplicate_between_agent_libs_fails() {
    let project = standard_project();
    project.jar(
        "agent/instrumentation-b.jar",
        &[("okhttp3/internal/publicsuffix/publicsuffixes.gz", vec![1, 2, 3])],
    );

    let err = standard_pipeline(&project)
        .run(&SilentProgress::new())
        .unwrap_err();

    assert_eq!(err.stage(), Some(Stage::RelocateAgentLibs));
    match err.root() {
        Error::DuplicateEntry { path, sources } => {
            assert_eq!(path, "com/splunk/shaded/okhttp3/internal/publicsuffix/publicsuffixes.gz");
            assert_eq!(sources, &vec!["instrumentation-b.jar", "okhttp-4.9.3.jar"]);
        }
        other => panic!("unexpected error: {other}"),
    }
    assert!(project.output_files().is_empty());
}

#[test]
fn test_duplicate_at_final_merge_keeps_first() {
    let project = standard_project();
    project.jar(
        "upstream/extra.jar",
        &[(
            "com/splunk/opentelemetry/bootstrap/Config.class",
            class_file("com/splunk/opentelemetry/bootstrap/Config", &["upstream-copy"]),
        )],
    );

    let config = project.config(&format!(
        r#"
[inputs]
bootstrap = ["bootstrap"]
agent_libs = ["agent"]
upstream = ["upstream"]
{}"#,
        RELOCATE_OKHTTP
    ));
    let report = Pipeline::new(config).unwrap().run(&SilentProgress::new()).unwrap();
    assert_eq!(report.stats.duplicates_skipped, 1);

    let bundle = read_jar(&project.classifier_jar());
    assert_eq!(
        bundle
            .get("com/splunk/opentelemetry/bootstrap/Config.class")
            .unwrap()
            .content,
        class_file("com/splunk/opentelemetry/bootstrap/Config", &[])
    );
}

#[test]
fn test_classifier_less_copy_is_identical() {
    let project = standard_project();
    let report = standard_pipeline(&project).run(&SilentProgress::new()).unwrap();

    let check = verify_twins(&report.classifier_jar, &report.primary_jar).unwrap();
    assert!(check.identical);
    assert_eq!(check.first_sha256, report.sha256);
    assert_eq!(
        project.output_files(),
        vec!["splunk-otel-javaagent-1.2.0-all.jar", "splunk-otel-javaagent-1.2.0.jar"]
    );
}

#[test]
fn test_manifest_attributes() {
    let project = standard_project();
    let report = standard_pipeline(&project).run(&SilentProgress::new()).unwrap();
    assert_eq!(report.implementation_version, "1.2.0-otel-1.15.0-alpha");

    for jar in [project.classifier_jar(), project.primary_jar()] {
        let bundle = read_jar(&jar);
        assert_eq!(bundle.entries()[0].path, "META-INF/MANIFEST.MF");
        let manifest = ManifestAttributes::parse(&bundle.entries()[0].content).unwrap();

        assert_eq!(
            manifest.value(MAIN_CLASS).unwrap(),
            "io.opentelemetry.javaagent.OpenTelemetryAgent"
        );
        assert_eq!(
            manifest.value(AGENT_CLASS).unwrap(),
            "com.splunk.opentelemetry.javaagent.SplunkAgent"
        );
        assert_eq!(manifest.value(PREMAIN_CLASS), manifest.value(AGENT_CLASS));
        assert_eq!(manifest.get(CAN_REDEFINE_CLASSES), Some(&AttributeValue::Flag(true)));
        assert_eq!(manifest.get(CAN_RETRANSFORM_CLASSES), Some(&AttributeValue::Flag(true)));
        assert_eq!(manifest.value(IMPLEMENTATION_VENDOR).unwrap(), "Splunk");
        assert_eq!(
            manifest.value(IMPLEMENTATION_VERSION).unwrap(),
            "1.2.0-otel-1.15.0-alpha"
        );
    }
}

#[test]
fn test_output_is_deterministic() {
    let project = standard_project();
    let pipeline = standard_pipeline(&project);

    let first = pipeline.run(&SilentProgress::new()).unwrap();
    let second = pipeline.run(&SilentProgress::new()).unwrap();
    assert_eq!(first.sha256, second.sha256);

    let assembled = pipeline.assemble(&SilentProgress::new()).unwrap();
    assert_eq!(
        agent_bundle::hash::sha256(&assembled.encode().unwrap()),
        first.sha256
    );
}

#[test]
fn test_failed_build_keeps_previous_outputs() {
    let project = standard_project();
    let first = standard_pipeline(&project).run(&SilentProgress::new()).unwrap();

    std::fs::write(project.path().join("agent/broken.jar"), b"not a zip").unwrap();

    let err = standard_pipeline(&project)
        .run(&SilentProgress::new())
        .unwrap_err();
    assert_eq!(err.stage(), Some(Stage::ResolveInputs));
    assert!(matches!(err.root(), Error::ArchiveRead { .. }));

    // Previous artifacts untouched, no temporaries left behind
    let check = verify_twins(&project.classifier_jar(), &project.primary_jar()).unwrap();
    assert_eq!(check.first_sha256, first.sha256);
    assert_eq!(project.output_files().len(), 2);
}

#[test]
fn test_unwritable_output_dir_fails_while_writing() {
    let project = standard_project();
    let first = standard_pipeline(&project).run(&SilentProgress::new()).unwrap();

    let blocked = project.path().join("blocked");
    std::fs::write(&blocked, b"a regular file").unwrap();
    let mut config = project.config(&format!("{}\n{}", INPUTS, RELOCATE_OKHTTP));
    config.set_output_dir(blocked.clone());

    let err = Pipeline::new(config)
        .unwrap()
        .run(&SilentProgress::new())
        .unwrap_err();
    assert_eq!(err.stage(), Some(Stage::WriteClassifierJar));
    match err.root() {
        Error::WriteFailure { path, .. } => assert_eq!(path, &blocked),
        other => panic!("unexpected error: {other}"),
    }
    assert_eq!(std::fs::read(&blocked).unwrap(), b"a regular file");

    let check = verify_twins(&project.classifier_jar(), &project.primary_jar()).unwrap();
    assert_eq!(check.first_sha256, first.sha256);
    assert_eq!(project.output_files().len(), 2);
    let leftovers: Vec<_> = std::fs::read_dir(project.path())
        .unwrap()
        .map(|e| e.unwrap().file_name().to_string_lossy().into_owned())
        .filter(|name| name.ends_with(".tmp"))
        .collect();
    assert!(leftovers.is_empty(), "{leftovers:?}");
}

#[test]
fn test_failed_primary_promotion_restores_classifier_jar() {
    let project = standard_project();
    standard_pipeline(&project).run(&SilentProgress::new()).unwrap();
    let previous = std::fs::read(project.classifier_jar()).unwrap();

    // A changed input, and a primary jar path that cannot be replaced
    project.jar(
        "agent/extra.jar",
        &[("com/splunk/instr/Extra.class", class_file("com/splunk/instr/Extra", &[]))],
    );
    std::fs::remove_file(project.primary_jar()).unwrap();
    std::fs::create_dir_all(project.primary_jar().join("occupied")).unwrap();

    let err = standard_pipeline(&project)
        .run(&SilentProgress::new())
        .unwrap_err();
    assert_eq!(err.stage(), Some(Stage::CopyPrimaryJar));
    assert!(matches!(err.root(), Error::WriteFailure { .. }));
    assert_eq!(std::fs::read(project.classifier_jar()).unwrap(), previous);
    assert_eq!(project.output_files().len(), 2);
}

#[test]
fn test_built_bundle_verifies() {
    let project = standard_project();
    let pipeline = standard_pipeline(&project);
    let report = pipeline.run(&SilentProgress::new()).unwrap();

    let verified = verify_bundle(&report.classifier_jar, pipeline.plan(), pipeline.shared()).unwrap();
    assert!(verified.valid, "{:?}", verified.problems);
    assert_eq!(verified.sha256, report.sha256);
    assert_eq!(verified.isolated_classes, 3);
}

#[test]
fn test_progress_reports_every_stage_in_order() {
    let project = standard_project();
    let events = Arc::new(Mutex::new(Vec::new()));
    let sink = events.clone();
    let progress = CallbackProgress::new(move |event| {
        if let ProgressEvent::Stage(stage) = event {
            sink.lock().unwrap().push(stage);
        }
    });

    standard_pipeline(&project).run(&progress).unwrap();
    assert_eq!(*events.lock().unwrap(), Stage::ALL.to_vec());
    assert!(agent_bundle::ProgressTracker::is_finished(&progress));
}

#[test]
fn test_dry_run_writes_nothing() {
    let project = standard_project();
    let bundle = standard_pipeline(&project)
        .assemble(&SilentProgress::new())
        .unwrap();

    assert_eq!(bundle.entry_count(), 9);
    assert!(project.output_files().is_empty());
}
