//! XML front end for the engine: parses one `<section>` document and
//! drives the engine's node-building contract with it.

use std::collections::BTreeMap;

use gb_core::{Attributes, GamebookError, NodeId};
use gb_engine::GamebookEngine;
use roxmltree::{Document, Node as XmlNode};

fn parse_error(err: impl std::fmt::Display) -> GamebookError {
    GamebookError::new("MARKUP_PARSE_ERROR", err.to_string())
}

/// Builds a fresh scene in the engine from section markup. The document
/// root must be a `<section>` element; its `name` attribute names the
/// section for navigation and snapshots.
pub fn build_section(
    engine: &mut GamebookEngine,
    source: &str,
) -> Result<NodeId, GamebookError> {
    let document = Document::parse(source).map_err(parse_error)?;
    let root = document.root_element();
    if root.tag_name().name() != "section" {
        return Err(GamebookError::new(
            "MARKUP_ROOT_ELEMENT",
            format!(
                "expected a <section> document, found <{}>",
                root.tag_name().name()
            ),
        ));
    }
    let name = root.attribute("name").unwrap_or_else(|| {
        log::warn!("section element without a name attribute");
        "section"
    });
    let section = engine.begin_section(name);
    for child in root.children() {
        drive(engine, section, child)?;
    }
    engine.handle_end_tag(section)?;
    Ok(section)
}

fn drive(
    engine: &mut GamebookEngine,
    parent: NodeId,
    xml: XmlNode<'_, '_>,
) -> Result<(), GamebookError> {
    if xml.is_element() {
        let mut map = BTreeMap::new();
        for attr in xml.attributes() {
            map.insert(attr.name().to_string(), attr.value().to_string());
        }
        let id = engine.create_node(parent, xml.tag_name().name(), Attributes::from_map(map))?;
        for child in xml.children() {
            drive(engine, id, child)?;
        }
        engine.handle_end_tag(id)?;
    } else if xml.is_text() {
        if let Some(text) = xml.text() {
            engine.handle_content(parent, text);
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use gb_core::{RunOutcome, SceneEvent, StyleHint};
    use gb_engine::{EngineOptions, GameState};

    fn engine() -> GamebookEngine {
        GamebookEngine::new(EngineOptions {
            random_seed: Some(5),
            instant_rolls: false,
            state: GameState::default(),
        })
    }

    #[test]
    fn builds_a_section_and_runs_it() {
        let mut engine = engine();
        build_section(
            &mut engine,
            r#"<section name="12">
                 <p>The cave narrows.</p>
                 <random var="luck"/>
                 <p>You squeeze through.</p>
               </section>"#,
        )
        .unwrap();
        assert_eq!(engine.section(), "12");
        assert_eq!(engine.start_execution().unwrap(), RunOutcome::Suspended);
        let events = engine.drain_events();
        assert!(events.iter().any(|event| matches!(
            event,
            SceneEvent::Content { text, style: StyleHint::Plain, .. }
                if text == "The cave narrows."
        )));
        // the roll node got its built-in label
        assert!(events.iter().any(|event| matches!(
            event,
            SceneEvent::Content { text, style: StyleHint::Action, .. }
                if text == "Roll 2 dice"
        )));
    }

    #[test]
    fn fight_markup_produces_cells_and_an_intro_line() {
        let mut engine = engine();
        let section = build_section(
            &mut engine,
            r#"<section name="7">
                 <fight name="Skeleton" combat="6" defence="4" stamina="12"/>
               </section>"#,
        )
        .unwrap();
        let fight = engine.children(section)[0];
        assert_eq!(engine.node_tag(fight), Some("fight"));
        let cells = engine.children(fight);
        assert_eq!(cells.len(), 3);
        let events = engine.drain_events();
        assert!(events.iter().any(|event| matches!(
            event,
            SceneEvent::Content { text, style: StyleHint::Italic, .. }
                if text == "Skeleton, COMBAT 6, Defence 4, Stamina 12"
        )));
    }

    #[test]
    fn unknown_elements_pass_through_as_containers() {
        let mut engine = engine();
        let section = build_section(
            &mut engine,
            r#"<section name="7"><glow><p>Strange light.</p></glow></section>"#,
        )
        .unwrap();
        assert_eq!(engine.start_execution().unwrap(), RunOutcome::Complete);
        let glow = engine.children(section)[0];
        assert_eq!(engine.node_tag(glow), Some("glow"));
        assert!(engine.is_enabled(glow));
    }

    #[test]
    fn rejects_a_document_without_a_section_root() {
        let mut engine = engine();
        let err = build_section(&mut engine, "<page/>").unwrap_err();
        assert_eq!(err.code, "MARKUP_ROOT_ELEMENT");
    }

    #[test]
    fn rejects_malformed_markup() {
        let mut engine = engine();
        let err = build_section(&mut engine, "<section name='1'>").unwrap_err();
        assert_eq!(err.code, "MARKUP_PARSE_ERROR");
    }
}
