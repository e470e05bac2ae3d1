use std::cell::RefCell;
use std::collections::BTreeMap;
use std::rc::{Rc, Weak};

use serde::{Deserialize, Serialize};

use crate::command::{Arg, Command, CommandDocument, CommandId, SyncOutcome};
use crate::error::SliderError;
use crate::graph::{FlowGraph, NodeId};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SliderSpec {
    pub value: f32,
    pub min: f32,
    pub max: f32,
    pub step: f32,
    #[serde(default)]
    pub anim_func: String,
}

impl SliderSpec {
    pub fn new(value: f32, min: f32, max: f32, step: f32) -> Self {
        Self {
            value,
            min,
            max,
            step,
            anim_func: String::new(),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Slider {
    node: NodeId,
    command: Option<CommandId>,
    value: f32,
    min: f32,
    max: f32,
    step: f32,
    anim_min: f32,
    anim_max: f32,
    anim_func: String,
}

impl Slider {
    fn new(
        name: &str,
        node: NodeId,
        command: Option<CommandId>,
        spec: SliderSpec,
    ) -> Result<Self, SliderError> {
        validate(name, &spec)?;
        Ok(Self {
            node,
            command,
            value: spec.value.clamp(spec.min, spec.max),
            min: spec.min,
            max: spec.max,
            step: spec.step,
            anim_min: spec.min,
            anim_max: spec.max,
            anim_func: spec.anim_func,
        })
    }

    /// Clamps into `[min, max]`; NaN is ignored. Returns the stored value.
    pub fn set_value(&mut self, value: f32) -> f32 {
        if !value.is_nan() {
            self.value = value.clamp(self.min, self.max);
        }
        self.value
    }

    pub fn value(&self) -> f32 {
        self.value
    }

    pub fn min(&self) -> f32 {
        self.min
    }

    pub fn max(&self) -> f32 {
        self.max
    }

    pub fn step(&self) -> f32 {
        self.step
    }

    pub fn set_anim_min(&mut self, value: f32) {
        self.anim_min = value;
    }

    pub fn set_anim_max(&mut self, value: f32) {
        self.anim_max = value;
    }

    pub fn anim_min(&self) -> f32 {
        self.anim_min
    }

    pub fn anim_max(&self) -> f32 {
        self.anim_max
    }

    pub fn anim_func(&self) -> &str {
        &self.anim_func
    }

    pub fn node(&self) -> NodeId {
        self.node
    }

    pub fn command(&self) -> Option<CommandId> {
        self.command
    }
}

fn validate(name: &str, spec: &SliderSpec) -> Result<(), SliderError> {
    if ![spec.value, spec.min, spec.max, spec.step]
        .iter()
        .all(|v| v.is_finite())
    {
        return Err(SliderError::NotFinite {
            name: name.to_string(),
        });
    }
    if spec.min > spec.max {
        return Err(SliderError::InvertedRange {
            name: name.to_string(),
            min: spec.min,
            max: spec.max,
        });
    }
    if spec.step <= 0.0 {
        return Err(SliderError::InvalidStep {
            name: name.to_string(),
            step: spec.step,
        });
    }
    Ok(())
}

/// Typically the GUI showing the sliders. Both calls happen synchronously
/// inside the bank call that caused them.
pub trait SliderObserver {
    fn on_slider_added(&self, slider: &Slider, name: &str);
    fn on_slider_removing(&self, slider: &Slider, name: &str);
}

#[derive(Default)]
struct ObserverList {
    next_key: u64,
    entries: Vec<(u64, Rc<dyn SliderObserver>)>,
}

/// Keeps an observer attached; dropping it detaches the observer.
#[must_use = "dropping the subscription detaches the observer"]
pub struct SliderSubscription {
    observers: Weak<RefCell<ObserverList>>,
    key: u64,
}

impl Drop for SliderSubscription {
    fn drop(&mut self) {
        if let Some(observers) = self.observers.upgrade() {
            observers
                .borrow_mut()
                .entries
                .retain(|(key, _)| *key != self.key);
        }
    }
}

#[derive(Default)]
pub struct SliderBank {
    sliders: BTreeMap<String, Slider>,
    retired: BTreeMap<String, NodeId>,
    observers: Rc<RefCell<ObserverList>>,
}

impl std::fmt::Debug for SliderBank {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SliderBank")
            .field("sliders", &self.sliders)
            .field("observers", &self.observers.borrow().entries.len())
            .finish()
    }
}

impl SliderBank {
    pub fn new() -> Self {
        Self::default()
    }

    /// Last write wins: a slider with the same name is replaced and its flow
    /// node reused, so anything wired to the old slider follows the new one.
    pub fn add_slider<T>(
        &mut self,
        graph: &mut FlowGraph<T>,
        name: &str,
        spec: SliderSpec,
        command: Option<CommandId>,
        payload: T,
    ) -> Result<&Slider, SliderError> {
        validate(name, &spec)?;
        let node = match self
            .sliders
            .get(name)
            .map(Slider::node)
            .or_else(|| self.retired.get(name).copied())
        {
            Some(node) => {
                graph.mark_dirty(node);
                node
            }
            None => graph.add_node(payload, &[])?,
        };
        let slider = Slider::new(name, node, command, spec)?;

        if let Some(previous) = self.sliders.remove(name) {
            self.notify(|observer| observer.on_slider_removing(&previous, name));
        }
        self.retired.remove(name);
        self.sliders.insert(name.to_string(), slider);
        tracing::debug!(name, "slider added");

        let slider = &self.sliders[name];
        for observer in self.snapshot_observers() {
            observer.on_slider_added(slider, name);
        }
        Ok(slider)
    }

    pub fn get_slider(&self, name: &str) -> Option<&Slider> {
        self.sliders.get(name)
    }

    pub fn value(&self, name: &str) -> Option<f32> {
        self.sliders.get(name).map(Slider::value)
    }

    pub fn names(&self) -> impl Iterator<Item = &str> + '_ {
        self.sliders.keys().map(String::as_str)
    }

    pub fn len(&self) -> usize {
        self.sliders.len()
    }

    pub fn is_empty(&self) -> bool {
        self.sliders.is_empty()
    }

    /// Returns the stored (clamped) value, or `None` for an unknown slider.
    pub fn set_value<T>(&mut self, graph: &mut FlowGraph<T>, name: &str, value: f32) -> Option<f32> {
        let slider = self.sliders.get_mut(name)?;
        let before = slider.value();
        let after = slider.set_value(value);
        if after != before {
            graph.mark_dirty(slider.node());
        }
        Some(after)
    }

    pub fn set_anim_range(&mut self, name: &str, min: f32, max: f32) -> bool {
        match self.sliders.get_mut(name) {
            Some(slider) => {
                slider.set_anim_min(min);
                slider.set_anim_max(max);
                true
            }
            None => false,
        }
    }

    /// Dependents are marked dirty and read the slider as missing from now on.
    pub fn remove_slider<T>(&mut self, graph: &mut FlowGraph<T>, name: &str) -> Option<Slider> {
        let slider = self.sliders.get(name)?;
        self.notify(|observer| observer.on_slider_removing(slider, name));
        let slider = self.sliders.remove(name)?;
        graph.mark_dirty(slider.node());
        self.retired.insert(name.to_string(), slider.node());
        Some(slider)
    }

    /// Replays every existing slider to the new observer before returning.
    pub fn add_observer(&self, observer: Rc<dyn SliderObserver>) -> SliderSubscription {
        let key = {
            let mut observers = self.observers.borrow_mut();
            let key = observers.next_key;
            observers.next_key += 1;
            observers.entries.push((key, observer.clone()));
            key
        };
        for (name, slider) in &self.sliders {
            observer.on_slider_added(slider, name);
        }
        SliderSubscription {
            observers: Rc::downgrade(&self.observers),
            key,
        }
    }

    pub fn observer_count(&self) -> usize {
        self.observers.borrow().entries.len()
    }

    /// Writes the slider's state into its `set` command, creating it if needed.
    pub fn sync_to_ast(&mut self, name: &str, doc: &mut CommandDocument) -> Option<SyncOutcome> {
        let slider = self.sliders.get_mut(name)?;
        let command = Command::new("set", name)
            .with_arg("value", Arg::Number(slider.value))
            .with_arg("min", Arg::Number(slider.min))
            .with_arg("max", Arg::Number(slider.max))
            .with_arg("step", Arg::Number(slider.step))
            .with_arg("anim_min", Arg::Number(slider.anim_min))
            .with_arg("anim_max", Arg::Number(slider.anim_max))
            .with_arg("anim_func", Arg::Text(slider.anim_func.clone()));
        let outcome = doc.write(slider.command, false, command);
        slider.command = Some(outcome.command);
        Some(outcome)
    }

    fn snapshot_observers(&self) -> Vec<Rc<dyn SliderObserver>> {
        self.observers
            .borrow()
            .entries
            .iter()
            .map(|(_, observer)| observer.clone())
            .collect()
    }

    fn notify(&self, mut f: impl FnMut(&dyn SliderObserver)) {
        for observer in self.snapshot_observers() {
            f(observer.as_ref());
        }
    }
}
