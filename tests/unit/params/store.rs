use super::*;
use std::cell::RefCell;
use std::rc::Rc;

use crate::foundation::error::PipelineError;
use crate::program::definition::{ProgramDefinition, ProgramHandle};
use crate::program::schema::{ParamDecl, ParamSchema, SCREEN_SIZE};
use crate::program::value::ParamType;
use crate::render::backend::PassDesc;
use crate::render::buffer_pool::OffscreenBufferPool;

#[derive(Default)]
struct RecordingBackend {
    writes: Vec<(String, ParameterValue)>,
}

impl PassBackend for RecordingBackend {
    fn bind_program(&mut self, _program: &ProgramHandle) -> PipelineResult<()> {
        Ok(())
    }

    fn write_parameter(
        &mut self,
        _block: &ParamBlockKey,
        name: &str,
        value: &ParameterValue,
    ) -> PipelineResult<()> {
        self.writes.push((name.to_owned(), value.clone()));
        Ok(())
    }

    fn exec_pass(
        &mut self,
        _pass: &PassDesc<'_>,
        _pool: &mut OffscreenBufferPool,
    ) -> PipelineResult<()> {
        Ok(())
    }
}

fn program(generation: u64) -> ShaderProgram {
    let schema = ParamSchema::new()
        .with(
            "Amount",
            ParamDecl::new(ParamType::Float)
                .with_default(ParameterValue::Float(0.5))
                .with_range(0.0, 1.0),
        )
        .unwrap()
        .with(SCREEN_SIZE, ParamDecl::new(ParamType::Vec2))
        .unwrap();
    let def = ProgramDefinition::from_source(
        "let c = sample(input, uv); vec4(c.rgb, c.a * Amount + ScreenSize.x * 0)",
        schema,
    );
    ShaderProgram::load(ShaderId::from("fade"), def, generation).unwrap()
}

fn layer() -> TargetId {
    TargetId::layer("ground")
}

fn recorder(notifier: &mut ChangeNotifier) -> Rc<RefCell<Vec<ParameterChanged>>> {
    let seen = Rc::new(RefCell::new(Vec::new()));
    let sink = Rc::clone(&seen);
    notifier.subscribe(move |e| sink.borrow_mut().push(e.clone()));
    seen
}

#[test]
fn first_commit_uploads_defaults() {
    let p = program(1);
    let mut store = ParameterStore::new();
    let mut backend = RecordingBackend::default();
    let mut notifier = ChangeNotifier::new();

    let writes = store.commit(&layer(), &p, &mut backend, &mut notifier).unwrap();
    assert_eq!(writes, 2);
    assert_eq!(
        store.get(&layer(), p.id(), "Amount"),
        Some(&ParameterValue::Float(0.5))
    );
}

#[test]
fn set_validates_immediately() {
    let p = program(1);
    let mut store = ParameterStore::new();

    let err = store
        .set(&layer(), &p, "Amont", ParameterValue::Float(0.1))
        .unwrap_err();
    assert!(matches!(err, PipelineError::UnknownParameter(_)));

    let err = store
        .set(&layer(), &p, "Amount", ParameterValue::Bool(true))
        .unwrap_err();
    assert!(matches!(err, PipelineError::TypeMismatch(_)));

    let err = store
        .set(&layer(), &p, "Amount", ParameterValue::Float(2.0))
        .unwrap_err();
    assert!(matches!(err, PipelineError::OutOfRange(_)));
}

#[test]
fn reserved_names_are_ignored_not_stored() {
    let p = program(1);
    let mut store = ParameterStore::new();
    let outcome = store
        .set(&layer(), &p, SCREEN_SIZE, ParameterValue::Vec2([1.0, 1.0]))
        .unwrap();
    assert_eq!(outcome, SetOutcome::IgnoredReserved);
    assert!(store.get(&layer(), p.id(), SCREEN_SIZE).is_none());
    assert_eq!(store.stats().ignored_reserved, 1);

    // The pipeline path still reaches it.
    assert!(
        store
            .inject(&layer(), &p, SCREEN_SIZE, ParameterValue::Vec2([8.0, 8.0]))
            .unwrap()
    );
    assert_eq!(
        store.get(&layer(), p.id(), SCREEN_SIZE),
        Some(&ParameterValue::Vec2([8.0, 8.0]))
    );
}

#[test]
fn same_value_twice_commits_once_and_notifies_once() {
    let p = program(1);
    let mut store = ParameterStore::new();
    let mut backend = RecordingBackend::default();
    let mut notifier = ChangeNotifier::new();
    store.commit(&layer(), &p, &mut backend, &mut notifier).unwrap();
    backend.writes.clear();
    let seen = recorder(&mut notifier);

    store
        .set(&layer(), &p, "Amount", ParameterValue::Float(0.25))
        .unwrap();
    store.commit(&layer(), &p, &mut backend, &mut notifier).unwrap();
    store
        .set(&layer(), &p, "Amount", ParameterValue::Float(0.25))
        .unwrap();
    assert!(!store.is_dirty(&layer(), p.id(), "Amount"));
    store.commit(&layer(), &p, &mut backend, &mut notifier).unwrap();

    assert_eq!(
        backend.writes,
        vec![("Amount".to_owned(), ParameterValue::Float(0.25))]
    );
    let seen = seen.borrow();
    assert_eq!(seen.len(), 1);
    assert_eq!(seen[0].old, Some(ParameterValue::Float(0.5)));
    assert_eq!(seen[0].new, ParameterValue::Float(0.25));
}

#[test]
fn vector_dirty_check_is_by_value() {
    let p = program(1);
    let mut store = ParameterStore::new();
    let mut backend = RecordingBackend::default();
    let mut notifier = ChangeNotifier::new();

    store
        .inject(&layer(), &p, SCREEN_SIZE, ParameterValue::Vec2([800.0, 600.0]))
        .unwrap();
    assert!(store.is_dirty(&layer(), p.id(), SCREEN_SIZE));
    store.commit(&layer(), &p, &mut backend, &mut notifier).unwrap();
    assert!(!store.is_dirty(&layer(), p.id(), SCREEN_SIZE));

    store
        .inject(&layer(), &p, SCREEN_SIZE, ParameterValue::Vec2([800.0, 600.0]))
        .unwrap();
    assert!(!store.is_dirty(&layer(), p.id(), SCREEN_SIZE));
    store
        .inject(&layer(), &p, SCREEN_SIZE, ParameterValue::Vec2([800.0, 601.0]))
        .unwrap();
    assert!(store.is_dirty(&layer(), p.id(), SCREEN_SIZE));
}

#[test]
fn new_program_generation_makes_the_block_fully_dirty() {
    let mut store = ParameterStore::new();
    let mut backend = RecordingBackend::default();
    let mut notifier = ChangeNotifier::new();

    store
        .commit(&layer(), &program(1), &mut backend, &mut notifier)
        .unwrap();
    assert_eq!(
        store
            .commit(&layer(), &program(1), &mut backend, &mut notifier)
            .unwrap(),
        0
    );
    assert_eq!(
        store
            .commit(&layer(), &program(2), &mut backend, &mut notifier)
            .unwrap(),
        2
    );
}

#[test]
fn remove_target_drops_only_its_blocks() {
    let p = program(1);
    let mut store = ParameterStore::new();
    store
        .set(&layer(), &p, "Amount", ParameterValue::Float(0.1))
        .unwrap();
    store
        .set(&TargetId::object(3), &p, "Amount", ParameterValue::Float(0.2))
        .unwrap();
    assert_eq!(store.block_count(), 2);
    assert_eq!(store.remove_target(&layer()), 1);
    assert!(store.get(&layer(), p.id(), "Amount").is_none());
    assert_eq!(
        store.get(&TargetId::object(3), p.id(), "Amount"),
        Some(&ParameterValue::Float(0.2))
    );
}

#[test]
fn reload_reuploads_without_notifying_unchanged_values() {
    let mut store = ParameterStore::new();
    let mut backend = RecordingBackend::default();
    let mut notifier = ChangeNotifier::new();
    store
        .inject(&layer(), &program(1), SCREEN_SIZE, ParameterValue::Vec2([800.0, 600.0]))
        .unwrap();
    store
        .commit(&layer(), &program(1), &mut backend, &mut notifier)
        .unwrap();
    backend.writes.clear();
    let seen = recorder(&mut notifier);

    let reloaded = program(2);
    store
        .inject(&layer(), &reloaded, SCREEN_SIZE, ParameterValue::Vec2([800.0, 600.0]))
        .unwrap();
    assert!(!store.is_dirty(&layer(), reloaded.id(), SCREEN_SIZE));
    let writes = store
        .commit(&layer(), &reloaded, &mut backend, &mut notifier)
        .unwrap();
    assert_eq!(writes, 2);
    assert_eq!(backend.writes.len(), 2);
    assert!(seen.borrow().is_empty());

    store
        .inject(&layer(), &reloaded, SCREEN_SIZE, ParameterValue::Vec2([800.0, 601.0]))
        .unwrap();
    store
        .commit(&layer(), &reloaded, &mut backend, &mut notifier)
        .unwrap();
    assert_eq!(seen.borrow().len(), 1);
    assert_eq!(seen.borrow()[0].old, Some(ParameterValue::Vec2([800.0, 600.0])));
}
