use super::engine_test_support::{attrs, child_node, seeded_engine};
use super::grouper::Step;
use super::*;
use gb_core::{FightResult, NodeId, RunOutcome, SceneEvent};

fn fight_ended_with(events: &[SceneEvent], result: FightResult) -> bool {
    events
        .iter()
        .any(|event| matches!(event, SceneEvent::FightEnded { result: r, .. } if *r == result))
}

#[test]
fn paragraphs_enable_in_order_and_goto_emits_section_change() {
    let mut engine = seeded_engine(1);
    let root = engine.begin_section("12");
    let para = child_node(&mut engine, root, "p", &[], Some("A corridor."));
    let exit = child_node(&mut engine, root, "goto", &[("section", "40")], None);
    assert_eq!(engine.start_execution().unwrap(), RunOutcome::Complete);
    assert!(engine.is_enabled(para));
    assert!(engine.is_enabled(exit));

    engine.drain_events();
    assert_eq!(engine.activate(exit).unwrap(), Activation::Done);
    let events = engine.drain_events();
    assert!(events.iter().any(|event| matches!(
        event,
        SceneEvent::GotoSection { section, flee: false } if section == "40"
    )));
    assert!(!engine.is_enabled(exit));
}

#[test]
fn forced_roll_suspends_until_triggered() {
    let mut engine = seeded_engine(7);
    let root = engine.begin_section("3");
    child_node(&mut engine, root, "p", &[], Some("Roll for your fate."));
    let roll = child_node(&mut engine, root, "random", &[("var", "fate")], None);
    let after = child_node(&mut engine, root, "p", &[], Some("You press on."));
    assert_eq!(engine.start_execution().unwrap(), RunOutcome::Suspended);
    assert!(engine.is_enabled(roll));
    assert!(!engine.is_enabled(after));

    engine.activate(roll).unwrap();
    let pending = engine.pending_roller().expect("a roller should be open");
    assert!(engine.roller_result(pending).is_err());
    engine.trigger_roll(pending).unwrap();

    let fate = engine.state().variable("fate").expect("fate should be set");
    assert!((2..=12).contains(&fate));
    assert_eq!(engine.roller_result(pending).unwrap(), fate);
    assert!(!engine.is_enabled(roll));
    assert!(engine.is_enabled(after));
}

#[test]
fn triggering_a_roller_twice_is_an_error() {
    let mut engine = seeded_engine(7);
    let root = engine.begin_section("3");
    let roll = child_node(&mut engine, root, "random", &[("var", "fate")], None);
    engine.start_execution().unwrap();
    engine.activate(roll).unwrap();
    let pending = engine.pending_roller().unwrap();
    engine.trigger_roll(pending).unwrap();
    let err = engine.trigger_roll(pending).unwrap_err();
    assert_eq!(err.code, "ROLLER_RESOLVED_TWICE");
}

#[test]
fn undo_reopens_the_last_roll() {
    let mut engine = seeded_engine(11);
    let root = engine.begin_section("3");
    let roll = child_node(&mut engine, root, "random", &[("var", "fate")], None);
    let after = child_node(&mut engine, root, "p", &[], Some("Too late to go back."));
    engine.start_execution().unwrap();
    engine.activate(roll).unwrap();
    let pending = engine.pending_roller().unwrap();
    engine.trigger_roll(pending).unwrap();
    assert!(engine.is_enabled(after));
    assert!(engine.can_undo());

    engine.undo().unwrap();
    assert_eq!(engine.state().variable("fate"), None);
    assert!(engine.is_enabled(roll));
    assert!(!engine.is_enabled(after));

    // the same node rolls again
    engine.activate(roll).unwrap();
    let pending = engine.pending_roller().unwrap();
    engine.trigger_roll(pending).unwrap();
    assert!(engine.state().variable("fate").is_some());
    assert!(engine.is_enabled(after));
}

#[test]
fn reroll_blocks_and_backtracks_to_the_previous_roll() {
    let mut engine = seeded_engine(13);
    let root = engine.begin_section("3");
    let roll = child_node(&mut engine, root, "random", &[("var", "luck")], None);
    let again = child_node(&mut engine, root, "reroll", &[], None);
    let after = child_node(&mut engine, root, "p", &[], Some("Done rolling."));
    engine.start_execution().unwrap();
    engine.activate(roll).unwrap();
    engine.trigger_roll(engine.pending_roller().unwrap()).unwrap();
    assert!(engine.is_enabled(again));
    assert!(!engine.is_enabled(after));

    engine.activate(again).unwrap();
    assert_eq!(engine.state().variable("luck"), None);
    assert!(engine.is_enabled(roll));
    assert!(!engine.is_enabled(again));
}

#[test]
fn adjustments_shift_the_rolled_total() {
    let mut engine = GamebookEngine::new(EngineOptions {
        random_seed: Some(3),
        instant_rolls: true,
        state: GameState::default(),
    });
    let root = engine.begin_section("3");
    let roll = engine
        .create_node(root, "random", attrs(&[("var", "r"), ("dice", "1")]))
        .unwrap();
    child_node(&mut engine, roll, "adjust", &[("amount", "3")], None);
    engine.handle_end_tag(roll).unwrap();
    engine.start_execution().unwrap();
    engine.activate(roll).unwrap();
    let total = engine.state().variable("r").unwrap();
    assert!((4..=9).contains(&total), "1d6+3 out of range: {total}");
}

#[test]
fn while_loops_until_its_variable_appears() {
    let mut engine = seeded_engine(17);
    let root = engine.begin_section("3");
    let body = engine
        .create_node(root, "while", attrs(&[("var", "done")]))
        .unwrap();
    let roll = child_node(&mut engine, body, "random", &[("var", "done")], None);
    engine.handle_end_tag(body).unwrap();
    let after = child_node(&mut engine, root, "p", &[], Some("Out of the loop."));
    assert_eq!(engine.start_execution().unwrap(), RunOutcome::Suspended);
    assert!(engine.is_enabled(roll));
    assert!(!engine.is_enabled(after));

    engine.activate(roll).unwrap();
    engine.trigger_roll(engine.pending_roller().unwrap()).unwrap();
    assert!(engine.state().variable("done").is_some());
    assert!(engine.is_enabled(after));
}

#[test]
fn while_with_a_defined_variable_is_a_no_op() {
    let mut engine = seeded_engine(17);
    engine.set_variable("done", 4);
    let root = engine.begin_section("3");
    let body = engine
        .create_node(root, "while", attrs(&[("var", "done")]))
        .unwrap();
    let roll = child_node(&mut engine, body, "random", &[("var", "other")], None);
    engine.handle_end_tag(body).unwrap();
    assert_eq!(engine.start_execution().unwrap(), RunOutcome::Complete);
    assert!(!engine.is_enabled(roll));
}

#[test]
fn taking_an_item_moves_it_into_possessions() {
    let mut engine = seeded_engine(19);
    let root = engine.begin_section("3");
    let sword = child_node(
        &mut engine,
        root,
        "item",
        &[("name", "Sword"), ("combat", "1")],
        None,
    );
    assert_eq!(engine.start_execution().unwrap(), RunOutcome::Complete);
    assert!(engine.is_enabled(sword));
    engine.activate(sword).unwrap();
    assert!(engine.state().possessions.contains("Sword"));
    assert!(!engine.is_enabled(sword));
}

#[test]
fn flagged_roll_waits_for_its_flag() {
    let mut engine = seeded_engine(23);
    let root = engine.begin_section("3");
    let roll = child_node(
        &mut engine,
        root,
        "random",
        &[("var", "r"), ("flag", "alerted"), ("force", "false")],
        None,
    );
    assert_eq!(engine.start_execution().unwrap(), RunOutcome::Complete);
    assert!(!engine.is_enabled(roll));
    engine.set_flag("alerted", true);
    assert!(engine.is_enabled(roll));
    engine.set_flag("alerted", false);
    assert!(!engine.is_enabled(roll));
}

#[test]
fn re_executing_a_finished_chain_is_a_no_op() {
    let mut engine = seeded_engine(79);
    let root = engine.begin_section("3");
    let para = child_node(&mut engine, root, "p", &[], Some("All quiet."));
    let roll = child_node(
        &mut engine,
        root,
        "random",
        &[("var", "r"), ("flag", "alerted")],
        None,
    );
    assert_eq!(engine.start_execution().unwrap(), RunOutcome::Complete);
    assert!(!engine.is_enabled(roll));

    // the raised flag re-enables the roll for a click, but the finished
    // chain must not run it again and suspend on it
    engine.set_flag("alerted", true);
    assert_eq!(engine.start_execution().unwrap(), RunOutcome::Complete);
    assert!(engine.pending_roller().is_none());
    assert!(engine.is_enabled(para));
}

fn skeleton_section(engine: &mut GamebookEngine) -> (NodeId, NodeId, NodeId) {
    let root = engine.begin_section("7");
    let fight = child_node(
        engine,
        root,
        "fight",
        &[
            ("name", "Skeleton"),
            ("combat", "6"),
            ("defence", "4"),
            ("stamina", "12"),
        ],
        None,
    );
    let after = child_node(engine, root, "p", &[], Some("The bones fall still."));
    (root, fight, after)
}

fn fight_cells(engine: &GamebookEngine, fight: NodeId) -> (NodeId, NodeId, NodeId) {
    let cells = engine.children(fight);
    (cells[0], cells[1], cells[2])
}

#[test]
fn attack_damage_is_clamped_to_enemy_stamina() {
    let mut engine = seeded_engine(29);
    let (_, fight, after) = skeleton_section(&mut engine);
    let (attack, defend, _) = fight_cells(&engine, fight);
    assert_eq!(engine.start_execution().unwrap(), RunOutcome::Suspended);
    assert!(engine.is_enabled(attack));
    assert!(!engine.is_enabled(after));

    // total 15 against Defence 4: 11 damage, stamina 12 -> 1
    engine.attack_roll_finished(fight, 15).unwrap();
    assert_eq!(engine.fights[0].stamina, 1);
    assert!(engine.is_enabled(defend));

    // enemy strikes back for 9 - defence 5 = 4
    engine.defend_roll_finished(fight, 9).unwrap();
    assert_eq!(engine.state().adventurer.stamina.current, 8);
    assert!(engine.is_enabled(attack));

    // overkill is clamped; only the last point is lost
    engine.attack_roll_finished(fight, 20).unwrap();
    assert_eq!(engine.fights[0].stamina, 0);
    let events = engine.drain_events();
    assert!(fight_ended_with(&events, FightResult::Won));
    assert!(engine.is_enabled(after));
}

#[test]
fn undoing_an_attack_restores_enemy_stamina() {
    let mut engine = seeded_engine(31);
    let (_, fight, _) = skeleton_section(&mut engine);
    let (attack, defend, _) = fight_cells(&engine, fight);
    engine.start_execution().unwrap();
    engine.attack_roll_finished(fight, 15).unwrap();
    assert_eq!(engine.fights[0].stamina, 1);

    engine.undo().unwrap();
    assert_eq!(engine.fights[0].stamina, 12);
    assert!(engine.is_enabled(attack));
    assert!(!engine.is_enabled(defend));
}

#[test]
fn undoing_a_defend_heals_the_player_and_replays_the_hit() {
    let mut engine = seeded_engine(31);
    let (_, fight, _) = skeleton_section(&mut engine);
    let (attack, defend, _) = fight_cells(&engine, fight);
    engine.start_execution().unwrap();
    engine.attack_roll_finished(fight, 10).unwrap();
    engine.defend_roll_finished(fight, 11).unwrap();
    assert_eq!(engine.state().adventurer.stamina.current, 6);

    engine.undo().unwrap();
    assert_eq!(engine.state().adventurer.stamina.current, 12);
    assert!(engine.is_enabled(defend));
    assert!(!engine.is_enabled(attack));
}

#[test]
fn extra_enemy_attacks_share_the_round_and_undo_takes_back_the_last() {
    let mut state = GameState::default();
    state.adventurer.stamina = StaminaStat::full(30);
    let mut engine = GamebookEngine::new(EngineOptions {
        random_seed: Some(83),
        instant_rolls: false,
        state,
    });
    let root = engine.begin_section("7");
    let fight = child_node(
        &mut engine,
        root,
        "fight",
        &[
            ("name", "Hydra"),
            ("combat", "6"),
            ("defence", "4"),
            ("stamina", "12"),
            ("attacks", "2"),
        ],
        None,
    );
    let (attack, defend, _) = fight_cells(&engine, fight);
    engine.start_execution().unwrap();
    engine.attack_roll_finished(fight, 10).unwrap();
    assert!(engine.is_enabled(defend));

    // first head: 9 - defence 5 = 4 damage, and the round is not over
    engine.defend_roll_finished(fight, 9).unwrap();
    assert_eq!(engine.state().adventurer.stamina.current, 26);
    assert!(!engine.is_enabled(attack));

    // the second head rolls on its own; only then does the attack reopen
    let pending = engine.pending_roller().expect("second sub-attack pending");
    engine.trigger_roll(pending).unwrap();
    let second_hit = (engine.roller_result(pending).unwrap() - 5).max(0);
    assert_eq!(engine.state().adventurer.stamina.current, 26 - second_hit);
    assert!(engine.is_enabled(attack));
    assert!(!engine.is_enabled(defend));

    // undo rewinds the second sub-attack only
    engine.undo().unwrap();
    assert_eq!(engine.state().adventurer.stamina.current, 26);
    assert_eq!(engine.fights[0].attack_number, 1);
    assert!(engine.is_enabled(defend));
    assert!(!engine.is_enabled(attack));
}

#[test]
fn losing_all_stamina_ends_the_fight_as_lost() {
    let mut engine = seeded_engine(37);
    let (_, fight, after) = skeleton_section(&mut engine);
    engine.start_execution().unwrap();
    engine.attack_roll_finished(fight, 5).unwrap();
    // a crushing blow: 20 - defence 5 = 15 damage against 12 stamina
    engine.defend_roll_finished(fight, 20).unwrap();
    assert!(engine.state().adventurer.is_dead());
    let events = engine.drain_events();
    assert!(fight_ended_with(&events, FightResult::Lost));
    // the section continues so death text can show
    assert!(engine.is_enabled(after));
}

#[test]
fn roller_driven_fight_reaches_a_deterministic_kill() {
    let mut engine = GamebookEngine::new(EngineOptions {
        random_seed: Some(41),
        instant_rolls: true,
        state: GameState::default(),
    });
    let root = engine.begin_section("7");
    let fight = child_node(
        &mut engine,
        root,
        "fight",
        &[
            ("name", "Rat"),
            ("combat", "1"),
            ("defence", "4"),
            ("stamina", "3"),
        ],
        None,
    );
    let (attack, _, _) = fight_cells(&engine, fight);
    engine.start_execution().unwrap();
    // 2d6 + COMBAT 6 is at least 8; 8 - Defence 4 kills a 3-stamina rat
    engine.activate(attack).unwrap();
    assert!(engine.fights[0].ended);
    let events = engine.drain_events();
    assert!(fight_ended_with(&events, FightResult::Won));
}

#[test]
fn grouped_fights_share_rounds_and_finish_together() {
    let mut engine = seeded_engine(43);
    let root = engine.begin_section("9");
    let first = child_node(
        &mut engine,
        root,
        "fight",
        &[
            ("name", "Bandit"),
            ("combat", "5"),
            ("defence", "2"),
            ("stamina", "4"),
            ("group", "ambush"),
        ],
        None,
    );
    let second = child_node(
        &mut engine,
        root,
        "fight",
        &[
            ("name", "Cutthroat"),
            ("combat", "5"),
            ("defence", "3"),
            ("stamina", "6"),
            ("group", "ambush"),
        ],
        None,
    );
    let after = child_node(&mut engine, root, "p", &[], Some("The ambush is over."));
    let (attack_a, defend_a, _) = fight_cells(&engine, first);
    let (attack_b, defend_b, _) = fight_cells(&engine, second);

    assert_eq!(engine.start_execution().unwrap(), RunOutcome::Suspended);
    // the leading fight preps the whole group
    assert!(engine.is_enabled(attack_a));
    assert!(engine.is_enabled(attack_b));

    // kill the bandit outright; the cutthroat still gets its round
    engine.attack_roll_finished(first, 10).unwrap();
    assert!(engine.fights[0].ended);
    assert!(!engine.fights[1].ended);
    assert!(!engine.is_enabled(defend_a));
    assert!(engine.is_enabled(defend_b));
    assert!(!engine.is_enabled(after));

    // a harmless counterattack, then the attack reopens for the survivor
    engine.defend_roll_finished(second, 2).unwrap();
    assert!(engine.is_enabled(attack_b));

    engine.attack_roll_finished(second, 12).unwrap();
    assert!(engine.fights[1].ended);
    let events = engine.drain_events();
    assert!(fight_ended_with(&events, FightResult::Won));
    assert!(engine.is_enabled(after));
}

#[test]
fn fleeing_through_a_marked_goto_ends_the_fight() {
    let mut engine = seeded_engine(47);
    let root = engine.begin_section("7");
    let _fight = child_node(
        &mut engine,
        root,
        "fight",
        &[
            ("name", "Ogre"),
            ("combat", "7"),
            ("defence", "6"),
            ("stamina", "10"),
        ],
        None,
    );
    let escape = child_node(
        &mut engine,
        root,
        "goto",
        &[("section", "99"), ("flee", "true")],
        None,
    );
    engine.start_execution().unwrap();
    assert!(engine.is_enabled(escape));

    engine.drain_events();
    engine.activate(escape).unwrap();
    assert!(engine.fights[0].fled);
    let events = engine.drain_events();
    assert!(fight_ended_with(&events, FightResult::Fled));
    assert!(events.iter().any(|event| matches!(
        event,
        SceneEvent::GotoSection { section, flee: true } if section == "99"
    )));
}

#[test]
fn skip_with_a_sure_win_drops_the_enemy() {
    let mut state = GameState::default();
    state.adventurer.defence = 20; // COMBAT 2 + 12 cannot reach this
    let mut engine = GamebookEngine::new(EngineOptions {
        random_seed: Some(53),
        instant_rolls: false,
        state,
    });
    let root = engine.begin_section("7");
    let fight = child_node(
        &mut engine,
        root,
        "fight",
        &[
            ("name", "Wretch"),
            ("combat", "2"),
            ("defence", "3"),
            ("stamina", "8"),
        ],
        None,
    );
    let (_, _, skip) = fight_cells(&engine, fight);
    engine.start_execution().unwrap();
    assert!(engine.is_enabled(skip));

    assert_eq!(engine.activate(skip).unwrap(), Activation::Done);
    assert_eq!(engine.fights[0].stamina, 0);
    let events = engine.drain_events();
    assert!(fight_ended_with(&events, FightResult::Won));
}

#[test]
fn deadlocked_skip_asks_the_host_to_pick_a_winner() {
    let mut state = GameState::default();
    state.adventurer.defence = 20;
    state.adventurer.combat = 2; // 2 + 12 cannot reach Defence 30
    let mut engine = GamebookEngine::new(EngineOptions {
        random_seed: Some(59),
        instant_rolls: false,
        state,
    });
    let root = engine.begin_section("7");
    let fight = child_node(
        &mut engine,
        root,
        "fight",
        &[
            ("name", "Statue"),
            ("combat", "2"),
            ("defence", "30"),
            ("stamina", "8"),
        ],
        None,
    );
    let (_, _, skip) = fight_cells(&engine, fight);
    engine.start_execution().unwrap();

    assert_eq!(
        engine.activate(skip).unwrap(),
        Activation::SkipPickWinner(fight)
    );
    engine.resolve_skip(fight, SkipWinner::Player).unwrap();
    let events = engine.drain_events();
    assert!(fight_ended_with(&events, FightResult::Won));
}

#[test]
fn contested_skip_fast_forwards_with_real_dice() {
    let mut engine = seeded_engine(61);
    let (_, fight, after) = skeleton_section(&mut engine);
    let (_, _, skip) = fight_cells(&engine, fight);
    engine.start_execution().unwrap();

    assert_eq!(engine.activate(skip).unwrap(), Activation::SkipConfirm(fight));
    engine.confirm_skip(fight).unwrap();
    assert!(engine.fights[0].ended || engine.state().adventurer.is_dead());
    assert!(engine.is_enabled(after) || engine.state().adventurer.is_dead());
}

#[test]
fn pre_damage_from_a_codeword_can_win_before_the_first_round() {
    let mut state = GameState::default();
    state.codewords.insert("Venom".to_string(), 9);
    let mut engine = GamebookEngine::new(EngineOptions {
        random_seed: Some(67),
        instant_rolls: false,
        state,
    });
    let root = engine.begin_section("7");
    child_node(
        &mut engine,
        root,
        "fight",
        &[
            ("name", "Spider"),
            ("combat", "4"),
            ("defence", "4"),
            ("stamina", "6"),
            ("preDamage", "Venom"),
        ],
        None,
    );
    let after = child_node(&mut engine, root, "p", &[], Some("It curls up, dead."));
    assert_eq!(engine.start_execution().unwrap(), RunOutcome::Complete);
    assert_eq!(engine.fights[0].stamina, 0);
    assert!(engine.is_enabled(after));
}

#[test]
fn stamina_lost_codeword_tracks_applied_damage() {
    let mut engine = seeded_engine(71);
    let root = engine.begin_section("7");
    let fight = child_node(
        &mut engine,
        root,
        "fight",
        &[
            ("name", "Troll"),
            ("combat", "6"),
            ("defence", "4"),
            ("stamina", "12"),
            ("staminaLost", "TrollWounds"),
        ],
        None,
    );
    engine.start_execution().unwrap();
    assert_eq!(engine.state().codeword("TrollWounds"), Some(0));
    engine.attack_roll_finished(fight, 10).unwrap();
    assert_eq!(engine.state().codeword("TrollWounds"), Some(6));
    engine.undo().unwrap();
    assert_eq!(engine.state().codeword("TrollWounds"), Some(0));
}

#[test]
fn hook_bodies_are_not_recorded_and_rewind_with_their_owner() {
    let mut engine = seeded_engine(89);
    let root = engine.begin_section("7");
    let roll = child_node(&mut engine, root, "random", &[("var", "r")], None);
    let mid = child_node(&mut engine, root, "p", &[], Some("It stirs."));
    let round = engine
        .create_node(root, "fightround", attrs(&[("pre", "true")]))
        .unwrap();
    let warning = child_node(&mut engine, round, "p", &[], Some("It hisses first."));
    engine.handle_end_tag(round).unwrap();
    let fight = child_node(
        &mut engine,
        root,
        "fight",
        &[
            ("name", "Wyrm"),
            ("combat", "6"),
            ("defence", "4"),
            ("stamina", "12"),
        ],
        None,
    );
    let (attack, _, _) = fight_cells(&engine, fight);

    assert_eq!(engine.start_execution().unwrap(), RunOutcome::Suspended);
    engine.activate(roll).unwrap();
    engine.trigger_roll(engine.pending_roller().unwrap()).unwrap();
    assert!(engine.is_enabled(warning));
    assert!(engine.is_enabled(attack));

    // the hook body ran under a raised counter: the log holds the outer
    // chain and the hook's own step, not the steps inside its body
    let entries = engine.undo.entries();
    assert!(entries.contains(&Step::Run(fight)));
    assert!(entries.contains(&Step::Run(round)));
    assert!(!entries.contains(&Step::Enable(warning)));

    // one undo rewinds the whole chain, hook body included
    engine.undo().unwrap();
    assert!(!engine.is_enabled(warning));
    assert!(!engine.is_enabled(attack));
    assert!(!engine.is_enabled(mid));
    assert!(engine.is_enabled(roll));
}

#[test]
fn fight_missing_required_stats_blocks_without_running() {
    let mut engine = seeded_engine(73);
    let root = engine.begin_section("7");
    let fight = child_node(&mut engine, root, "fight", &[("name", "Ghost")], None);
    let after = child_node(&mut engine, root, "p", &[], Some("Unreachable."));
    assert_eq!(engine.start_execution().unwrap(), RunOutcome::Suspended);
    let (attack, _, _) = fight_cells(&engine, fight);
    assert!(!engine.is_enabled(attack));
    assert!(!engine.is_enabled(after));
}
