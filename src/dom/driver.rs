//! DOM driver - renders `VNode` sinks into a container, exposes its events.

use std::fmt;

use crate::error::{Error, Result};
use crate::restart::{Capture, Recorder};
use crate::runtime::Driver;
use crate::stream::{Listener, Stream, Subscription};

use super::document::{Container, Document, DomEvent};
use super::vnode::{Selector, VNode};

// =============================================================================
// DOM Source
// =============================================================================

/// What the DOM driver hands to `main`: a scoped view of the container.
///
/// ```ignore
/// let add = sources.get::<DomSource>("DOM")?.select(".add").events("click");
/// ```
#[derive(Clone)]
pub struct DomSource {
    container: Container,
    scope: Vec<Selector>,
    sink: Subscription,
    recorder: Option<Recorder<DomEvent>>,
}

impl DomSource {
    fn new(container: Container, sink: Subscription) -> Self {
        Self {
            container,
            scope: Vec::new(),
            sink,
            recorder: None,
        }
    }

    /// Narrow to nodes matching `selector` inside the current scope.
    pub fn select(&self, selector: &str) -> DomSource {
        let mut scoped = self.clone();
        scoped.scope.push(Selector::parse(selector));
        scoped
    }

    /// Events of type `kind` dispatched inside the current scope.
    pub fn events(&self, kind: &str) -> Stream<DomEvent> {
        let container = self.container.clone();
        let scope = self.scope.clone();
        let event_kind = kind.to_string();
        let live = Stream::new(move |listener: Listener<DomEvent>| {
            container.on(&event_kind, scope.clone(), move |event| listener(event))
        });

        match &self.recorder {
            Some(recorder) => recorder.record(self.key(kind), live),
            None => live,
        }
    }

    /// Painted nodes matching the current scope.
    pub fn elements(&self) -> Vec<VNode> {
        self.container
            .tree()
            .map(|root| root.select_all(&self.scope).into_iter().cloned().collect())
            .unwrap_or_default()
    }

    pub fn container(&self) -> &Container {
        &self.container
    }

    /// Recording key for `kind` events in this scope (`".add click"`).
    pub fn key(&self, kind: &str) -> String {
        let mut parts: Vec<String> = self.scope.iter().map(Selector::to_string).collect();
        parts.push(kind.to_string());
        parts.join(" ")
    }

    fn dispose(&self) {
        self.sink.unsubscribe();
    }
}

impl Capture for DomSource {
    type Event = DomEvent;

    fn capture(&self, recorder: &Recorder<DomEvent>) -> Self {
        Self {
            recorder: Some(recorder.clone()),
            ..self.clone()
        }
    }
}

impl fmt::Debug for DomSource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DomSource")
            .field("container", &self.container.selector())
            .field("scope", &self.scope.iter().map(Selector::to_string).collect::<Vec<_>>())
            .field("recording", &self.recorder.is_some())
            .finish()
    }
}

// =============================================================================
// DOM Driver
// =============================================================================

/// Driver mounting into one container of a document.
pub struct DomDriver {
    document: Document,
    selector: String,
}

/// DOM driver for the container registered under `selector`.
///
/// The container is looked up when the driver is called, so it only has to
/// exist by the time the app runs.
pub fn make_dom_driver(document: &Document, selector: &str) -> DomDriver {
    DomDriver {
        document: document.clone(),
        selector: selector.to_string(),
    }
}

impl Driver for DomDriver {
    type Sink = VNode;
    type Source = DomSource;

    fn call(&self, sink: Option<Stream<VNode>>, name: &str) -> Result<DomSource> {
        let container = self.document.query(&self.selector).ok_or_else(|| {
            Error::driver(name, format!("no container matches `{}`", self.selector))
        })?;
        container.mount();

        let subscription = match sink {
            Some(sink) => {
                let target = container.clone();
                sink.subscribe(move |node| target.patch(node))
            }
            None => Subscription::empty(),
        };
        Ok(DomSource::new(container, subscription))
    }

    fn dispose(&self, source: &DomSource) {
        source.dispose();
        source.container.unmount();
    }
}

impl fmt::Debug for DomDriver {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DomDriver").field("selector", &self.selector).finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dom::vnode::{button, div};
    use crate::restart::EventLog;
    use crate::stream::Subject;
    use std::cell::RefCell;
    use std::rc::Rc;

    #[test]
    fn test_missing_container_is_a_driver_error() {
        let document = Document::new();
        let driver = make_dom_driver(&document, ".app");
        let err = driver.call(None, "DOM").unwrap_err();
        assert!(matches!(err, Error::Driver { ref name, .. } if name == "DOM"));
    }

    #[test]
    fn test_sink_patches_container() {
        let document = Document::new();
        let container = document.create_container(".app");
        let driver = make_dom_driver(&document, ".app");
        let views = Subject::new();

        let source = driver.call(Some(views.stream()), "DOM").unwrap();
        views.send(div(".app", "hello"));
        assert_eq!(container.text(".app"), "hello");

        driver.dispose(&source);
        views.send(div(".app", "ignored"));
        assert!(!container.is_mounted());
        assert_eq!(container.text(".app"), "");
    }

    #[test]
    fn test_select_events() {
        let document = Document::new();
        let container = document.create_container(".app");
        let driver = make_dom_driver(&document, ".app");
        let source = driver.call(None, "DOM").unwrap();
        container.patch(div(".app", vec![button(".add", "+"), button(".sub", "-")]));

        let seen = Rc::new(RefCell::new(Vec::new()));
        let seen_clone = seen.clone();
        let _sub = source
            .select(".add")
            .events("click")
            .subscribe(move |e| seen_clone.borrow_mut().push(e.target.classes[0].clone()));

        container.click(".add");
        container.click(".sub");
        assert_eq!(*seen.borrow(), vec!["add"]);
        assert_eq!(source.select(".add").elements().len(), 1);
        assert_eq!(source.select(".app").select(".add").key("click"), ".app .add click");
    }

    #[test]
    fn test_captured_source_records_clicks() {
        let document = Document::new();
        let container = document.create_container(".app");
        let source = make_dom_driver(&document, ".app").call(None, "DOM").unwrap();
        container.patch(div(".app", vec![button(".add", "+")]));

        let log = EventLog::new();
        let captured = source.capture(&Recorder::new(log.clone()));
        let _sub = captured.select(".add").events("click").subscribe(|_| {});

        container.click(".add");
        container.click(".add");
        assert_eq!(log.len(), 2);
        assert_eq!(log.snapshot()[0].key, ".add click");
    }
}
