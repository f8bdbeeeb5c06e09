use appup_core::registry::BoxError;
use appup_core::{
    Activator, ContribRegistry, ModuleContext, ModuleError, ModuleLoader, Platform, ScratchDir,
    Service, ServiceRegistry, TypeCatalog,
};
use std::collections::BTreeMap;
use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};
use tempfile::TempDir;
use zip::write::SimpleFileOptions;
use zip::ZipWriter;

type Log = Arc<Mutex<Vec<String>>>;

const PLUGIN: &str = r#"<plugin><extension point="demo.point"><item id="one"/></extension></plugin>"#;

struct Marker;
impl Service for Marker {}

struct RecordingActivator {
    log: Log,
    fail_start: bool,
}

impl Activator for RecordingActivator {
    fn start(&mut self, context: &ModuleContext<'_>) -> Result<(), BoxError> {
        if self.fail_start {
            return Err("activator refused".into());
        }
        let name = context.symbolic_name().unwrap_or("-").to_string();
        let xml = context.find_paths("", "*.xml", true)?;
        let mut log = self.log.lock().expect("log lock");
        log.push(format!("start:{name}"));
        log.push(format!("prop:{}", context.property("greeting").unwrap_or("-")));
        log.push(format!("installed:{}", context.installed().len()));
        log.push(format!("xml:{}", xml.join(",")));
        context.register_service("svc.FromModule", Arc::new(Marker));
        Ok(())
    }

    fn stop(&mut self, context: &ModuleContext<'_>) -> Result<(), BoxError> {
        self.log
            .lock()
            .expect("log lock")
            .push(format!("stop:{}", context.symbolic_name().unwrap_or("-")));
        Ok(())
    }
}

struct Fixture {
    work: TempDir,
    registry: Arc<ServiceRegistry>,
    contrib: Arc<ContribRegistry>,
    loader: ModuleLoader,
    log: Log,
}

fn fixture() -> Fixture {
    let work = tempfile::tempdir().expect("work dir");
    let log = Log::default();
    let catalog = Arc::new(TypeCatalog::new());
    for (name, fail_start) in [("test.Activator", false), ("test.Failing", true)] {
        let log = Arc::clone(&log);
        catalog.add_activator(name, move || {
            Ok(Box::new(RecordingActivator {
                log: Arc::clone(&log),
                fail_start,
            }))
        });
    }

    let registry = Arc::new(ServiceRegistry::new(catalog.clone()));
    let contrib = Arc::new(ContribRegistry::new());
    let scratch = Arc::new(ScratchDir::new(work.path().join("scratch")).expect("scratch dir"));
    let loader = ModuleLoader::new(catalog, Arc::clone(&registry), Arc::clone(&contrib), scratch)
        .with_properties(BTreeMap::from([(
            "greeting".to_string(),
            "hello".to_string(),
        )]))
        .with_platform(Platform::new("linux", "x86_64"));

    Fixture {
        work,
        registry,
        contrib,
        loader,
        log,
    }
}

fn directory_module(root: &Path, name: &str, manifest: &str) -> PathBuf {
    let dir = root.join(name);
    fs::create_dir_all(dir.join("META-INF")).expect("module dirs");
    fs::write(dir.join("META-INF/MANIFEST.MF"), manifest).expect("write manifest");
    fs::write(dir.join("plugin.xml"), PLUGIN).expect("write plugin");
    dir
}

fn archive_module(root: &Path, name: &str, entries: &[(&str, &str)]) -> PathBuf {
    let path = root.join(name);
    let file = fs::File::create(&path).expect("create archive");
    let mut writer = ZipWriter::new(file);
    for (entry, content) in entries {
        writer
            .start_file(*entry, SimpleFileOptions::default())
            .expect("start entry");
        writer.write_all(content.as_bytes()).expect("write entry");
    }
    writer.finish().expect("finish archive");
    path
}

fn log_entries(log: &Log) -> Vec<String> {
    log.lock().expect("log lock").clone()
}

#[test]
fn directory_module_installs_and_activates() {
    let mut fixture = fixture();
    let module = directory_module(
        fixture.work.path(),
        "net",
        "Manifest-Version: 1.0\nBundle-SymbolicName: org.example.net;singleton:=true\nBundle-Activator: test.Activator\nBundle-ClassPath: .,lib/extra.jar\n",
    );

    let descriptor = fixture.loader.install(&module).expect("install");
    assert_eq!(descriptor.symbolic_name(), Some("org.example.net"));
    assert_eq!(descriptor.format(), "directory");
    let canonical = fs::canonicalize(&module).expect("canonical module path");
    assert_eq!(descriptor.code_paths(), [canonical.join("lib/extra.jar")].as_slice());
    assert_eq!(fixture.contrib.contributions_for("demo.point").len(), 1);
    assert_eq!(
        fixture.contrib.contributions_for("demo.point")[0].owner().id(),
        "org.example.net"
    );

    fixture.loader.start(&module).expect("start");
    fixture.loader.start(&module).expect("second start is a no-op");
    assert!(fixture.loader.is_started(&module));
    assert_eq!(
        log_entries(&fixture.log),
        vec![
            "start:org.example.net",
            "prop:hello",
            "installed:1",
            "xml:plugin.xml",
        ]
    );
    assert!(fixture.registry.lookup("svc.FromModule").is_ok());

    fixture.loader.stop(&module).expect("stop");
    fixture.loader.stop(&module).expect("second stop is a no-op");
    assert!(!fixture.loader.is_started(&module));
    assert_eq!(
        log_entries(&fixture.log).last().map(String::as_str),
        Some("stop:org.example.net")
    );
}

#[test]
fn archive_module_extracts_platform_native_code() {
    let mut fixture = fixture();
    let module = archive_module(
        fixture.work.path(),
        "native.jar",
        &[
            (
                "META-INF/MANIFEST.MF",
                "Manifest-Version: 1.0\r\nBundle-SymbolicName: org.example.native\r\nBundle-ClassPath: .,lib/extra.jar,lib/absent.jar\r\nBundle-NativeCode: lib/libnative.so;osname=linux;processor=x86_64,\r\n lib/native.dll;osname=win32\r\n",
            ),
            ("lib/libnative.so", "elf"),
            ("lib/native.dll", "pe"),
            ("lib/extra.jar", "jar"),
            ("plugin.xml", PLUGIN),
        ],
    );

    let scratch = fixture.loader.scratch().path().to_path_buf();
    let descriptor = fixture.loader.install(&module).expect("install archive");
    assert_eq!(descriptor.format(), "zip");

    assert_eq!(descriptor.native_files(), [scratch.join("libnative.so")].as_slice());
    assert_eq!(
        fs::read_to_string(scratch.join("libnative.so")).expect("extracted native"),
        "elf"
    );
    assert!(!scratch.join("native.dll").exists());

    assert_eq!(descriptor.code_paths().len(), 1);
    let code_path = &descriptor.code_paths()[0];
    assert!(code_path.starts_with(&scratch));
    assert_eq!(fs::read_to_string(code_path).expect("extracted code path"), "jar");

    assert_eq!(fixture.contrib.points(), vec!["demo.point".to_string()]);

    fixture.loader.start(&module).expect("start without activator");
    assert!(fixture.loader.is_started(&module));
}

#[test]
fn declared_but_missing_native_entry_fails_install() {
    let mut fixture = fixture();
    let module = archive_module(
        fixture.work.path(),
        "ghost.jar",
        &[(
            "META-INF/MANIFEST.MF",
            "Bundle-SymbolicName: ghost\nBundle-NativeCode: lib/ghost.so\n",
        )],
    );

    match fixture.loader.install(&module) {
        Err(ModuleError::Io { source, .. }) => {
            assert_eq!(source.kind(), std::io::ErrorKind::NotFound)
        }
        Err(other) => panic!("expected i/o error, got {other}"),
        Ok(_) => panic!("install must fail"),
    }
}

#[test]
fn manifest_problems_are_reported() {
    let mut fixture = fixture();

    let bare = fixture.work.path().join("bare");
    fs::create_dir_all(&bare).expect("bare dir");
    assert!(matches!(
        fixture.loader.install(&bare),
        Err(ModuleError::Io { .. })
    ));

    let broken = directory_module(fixture.work.path(), "broken", "this is not a header\n");
    let err = fixture
        .loader
        .install(&broken)
        .map(|_| ())
        .expect_err("malformed manifest must fail");
    assert!(matches!(err, ModuleError::Manifest { .. }));
    assert!(err.is_configuration());
    assert!(fixture.loader.installed().is_empty());
}

#[test]
fn start_failures_leave_module_stopped() {
    let mut fixture = fixture();
    let not_installed = fixture.work.path().join("nothing");
    assert!(matches!(
        fixture.loader.start(&not_installed),
        Err(ModuleError::NotInstalled(_))
    ));

    let unknown = directory_module(
        fixture.work.path(),
        "unknown",
        "Bundle-SymbolicName: unknown\nBundle-Activator: test.Unregistered\n",
    );
    fixture.loader.install(&unknown).expect("install");
    assert!(matches!(
        fixture.loader.start(&unknown),
        Err(ModuleError::ActivatorNotFound { .. })
    ));

    let failing = directory_module(
        fixture.work.path(),
        "failing",
        "Bundle-SymbolicName: failing\nBundle-Activator: test.Failing\n",
    );
    fixture.loader.install(&failing).expect("install");
    assert!(matches!(
        fixture.loader.start(&failing),
        Err(ModuleError::Activation { .. })
    ));
    assert!(!fixture.loader.is_started(&failing));
    fixture.loader.stop(&failing).expect("stopping a failed module is a no-op");
    assert!(log_entries(&fixture.log).is_empty());
}

#[test]
fn stop_all_runs_in_reverse_install_order_and_reinstall_is_idempotent() {
    let mut fixture = fixture();
    let first = directory_module(
        fixture.work.path(),
        "first",
        "Bundle-SymbolicName: first\nBundle-Activator: test.Activator\n",
    );
    let second = directory_module(
        fixture.work.path(),
        "second",
        "Bundle-SymbolicName: second\nBundle-Activator: test.Activator\n",
    );

    fixture.loader.install(&first).expect("install first");
    fixture.loader.install(&second).expect("install second");
    fixture.loader.install(&first).expect("reinstall first");
    assert_eq!(fixture.loader.installed().len(), 2);

    fixture.loader.start(&first).expect("start first");
    fixture.loader.start(&second).expect("start second");
    assert!(fixture.loader.stop_all().is_empty());

    let stops: Vec<String> = log_entries(&fixture.log)
        .into_iter()
        .filter(|entry| entry.starts_with("stop:"))
        .collect();
    assert_eq!(stops, vec!["stop:second", "stop:first"]);
}

#[test]
fn reinstalling_an_archive_keeps_its_native_files() {
    let mut fixture = fixture();
    let module = archive_module(
        fixture.work.path(),
        "again.jar",
        &[
            (
                "META-INF/MANIFEST.MF",
                "Bundle-SymbolicName: org.example.again\nBundle-NativeCode: lib/libnative.so;processor=amd64\n",
            ),
            ("lib/libnative.so", "elf"),
        ],
    );

    let scratch = fixture.loader.scratch().path().to_path_buf();
    let first = fixture
        .loader
        .install(&module)
        .expect("install archive")
        .native_files()
        .to_vec();
    assert_eq!(first, vec![scratch.join("libnative.so")]);

    let second = fixture
        .loader
        .install(&module)
        .expect("reinstall archive")
        .native_files()
        .to_vec();
    assert_eq!(second, first);
    assert_eq!(fixture.loader.installed().len(), 1);
    assert!(scratch.join("libnative.so").is_file());
}
