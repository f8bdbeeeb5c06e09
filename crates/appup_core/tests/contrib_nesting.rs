use appup_core::registry::BoxError;
use appup_core::{
    downcast, ContribError, ContribOwner, ContribRegistry, Dependency, Service, ServiceHandle,
    ServiceRegistry, TypeCatalog,
};
use std::sync::Arc;
use std::thread;

const PLUGIN: &str = r#"<?xml version="1.0" encoding="UTF-8"?>
<plugin>
   <extension point="object">
      <object class="svc.Widget"/>
   </extension>
   <extension point="bad-object">
      <object class="svc.DoesNotExist"/>
   </extension>
   <extension point="abstract-object">
      <object class="svc.Abstract" blank=""/>
   </extension>
   <extension point="nested">
      <top value="top-value">
         <empty/>
         <middle value="middle-value">
            <bottom value="bottom-value"/>
         </middle>
      </top>
   </extension>
   <extension point="jobs.backup_complete">
      <listener class="jobs.BackupResultsSender"/>
   </extension>
</plugin>
"#;

struct Clock;
impl Service for Clock {}

struct Widget {
    clock: Option<ServiceHandle>,
    initialized: bool,
}

impl Service for Widget {
    fn dependencies(&self) -> Vec<Dependency> {
        vec![Dependency::new("clock", "svc.Clock")]
    }

    fn inject(&mut self, _dependency: &Dependency, service: ServiceHandle) -> Result<(), BoxError> {
        self.clock = Some(service);
        Ok(())
    }

    fn on_init(&mut self) -> Result<(), BoxError> {
        self.initialized = true;
        Ok(())
    }
}

fn catalog() -> Arc<TypeCatalog> {
    let catalog = TypeCatalog::new();
    catalog.add_resource("svc.Clock", || Ok(Box::new(Clock)));
    catalog.add_type("svc.Widget", || {
        Ok(Box::new(Widget {
            clock: None,
            initialized: false,
        }))
    });
    catalog.add_interface("svc.Abstract");
    Arc::new(catalog)
}

fn load(catalog: Arc<TypeCatalog>) -> ContribRegistry {
    let registry = ContribRegistry::new();
    let owner = ContribOwner::new("test", catalog).with_location("/plugins/test");
    registry
        .register(Arc::new(owner), PLUGIN)
        .expect("plugin document parses");
    registry
}

#[test]
fn nested_elements_are_preserved() {
    let registry = load(catalog());

    let nested = registry.contributions_for("nested");
    assert_eq!(nested.len(), 1);
    let top = &nested[0];
    assert_eq!(top.name(), "top");
    assert_eq!(top.attribute("value"), Some("top-value"));
    assert_eq!(top.owner().id(), "test");
    assert_eq!(
        top.owner().location().map(|path| path.to_string_lossy().into_owned()),
        Some("/plugins/test".to_string())
    );
    assert_eq!(top.children(None).len(), 2);
    assert_eq!(top.children(Some("empty")).len(), 1);

    let middle = top.children(Some("middle"));
    assert_eq!(middle.len(), 1);
    assert_eq!(middle[0].name(), "middle");
    assert_eq!(middle[0].attribute("value"), Some("middle-value"));

    let bottom = middle[0].children(Some("bottom"));
    assert_eq!(bottom.len(), 1);
    assert_eq!(bottom[0].name(), "bottom");
    assert_eq!(bottom[0].attribute("value"), Some("bottom-value"));
    assert!(bottom[0].children(None).is_empty());
}

#[test]
fn unknown_point_has_no_contributions() {
    let registry = load(catalog());
    assert!(registry.contributions_for("none").is_empty());
    assert_eq!(registry.points().len(), 5);
}

#[test]
fn create_instance_injects_and_initializes() {
    let catalog = catalog();
    let services = ServiceRegistry::new(catalog.clone());
    let registry = load(catalog);

    let elements = registry.contributions_for("object");
    assert_eq!(elements.len(), 1);
    let instance = elements[0]
        .create_instance("class", &services)
        .expect("widget instantiates");

    let handle: ServiceHandle = Arc::from(instance);
    let widget = downcast::<Widget>(&handle).expect("widget type");
    assert!(widget.initialized);
    let clock = services.lookup("svc.Clock").expect("clock bound by injection");
    assert!(Arc::ptr_eq(widget.clock.as_ref().expect("clock injected"), &clock));
}

#[test]
fn create_instance_reports_each_failure_kind() {
    let catalog = catalog();
    let services = ServiceRegistry::new(catalog.clone());
    let registry = load(catalog);

    let bad = registry.contributions_for("bad-object");
    assert!(matches!(
        bad[0].create_instance("class", &services),
        Err(ContribError::TypeNotFound(name)) if name == "svc.DoesNotExist"
    ));

    let abstract_object = registry.contributions_for("abstract-object");
    assert!(matches!(
        abstract_object[0].create_instance("class", &services),
        Err(ContribError::NotInstantiable(_))
    ));
    assert!(matches!(
        abstract_object[0].create_instance("missing", &services),
        Err(ContribError::MissingAttribute { .. })
    ));
    assert!(matches!(
        abstract_object[0].create_instance("blank", &services),
        Err(ContribError::EmptyAttribute { .. })
    ));
}

#[test]
fn concurrent_readers_see_the_same_contributions() {
    let registry = Arc::new(load(catalog()));

    let handles: Vec<_> = (0..20)
        .map(|_| {
            let registry = Arc::clone(&registry);
            thread::spawn(move || {
                let elements = registry.contributions_for("jobs.backup_complete");
                assert_eq!(elements.len(), 1);
                assert_eq!(elements[0].attribute("class"), Some("jobs.BackupResultsSender"));
            })
        })
        .collect();

    for handle in handles {
        handle.join().expect("reader thread");
    }
}
