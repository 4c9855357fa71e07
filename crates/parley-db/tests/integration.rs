use parley_db::Database;
use parley_types::models::MessageKind;

fn db() -> Database {
    Database::open_in_memory().unwrap()
}

fn seed_users(db: &Database, names: &[&str]) {
    for name in names {
        assert!(db.create_user(name, "hash").unwrap());
    }
}

#[test]
fn duplicate_username_is_rejected() {
    let db = db();
    assert!(db.create_user("ava", "hash-1").unwrap());
    assert!(!db.create_user("ava", "hash-2").unwrap());

    // first registration wins
    let user = db.get_user_by_username("ava").unwrap().unwrap();
    assert_eq!(user.password, "hash-1");
}

#[test]
fn friend_request_lifecycle() {
    let db = db();
    seed_users(&db, &["ava", "ben"]);

    assert!(db.add_friend_request("ben", "ava").unwrap());
    // repeat is a no-op
    assert!(!db.add_friend_request("ben", "ava").unwrap());

    let sidebar = db.sidebar("ben").unwrap().unwrap();
    assert_eq!(sidebar.friend_requests, vec!["ava"]);
    assert!(sidebar.friends.is_empty());

    assert!(db.accept_friend_request("ben", "ava").unwrap());

    let ben = db.sidebar("ben").unwrap().unwrap();
    let ava = db.sidebar("ava").unwrap().unwrap();
    assert_eq!(ben.friends, vec!["ava"]);
    assert_eq!(ava.friends, vec!["ben"]);
    assert!(ben.friend_requests.is_empty());
    assert!(ava.friend_requests.is_empty());

    // once friends, a new request is a no-op
    assert!(!db.add_friend_request("ben", "ava").unwrap());
    // accepting again fails (nothing pending)
    assert!(!db.accept_friend_request("ben", "ava").unwrap());
}

#[test]
fn decline_removes_only_the_pending_entry() {
    let db = db();
    seed_users(&db, &["ava", "ben"]);

    db.add_friend_request("ben", "ava").unwrap();
    assert!(db.decline_friend_request("ben", "ava").unwrap());
    assert!(!db.decline_friend_request("ben", "ava").unwrap());

    let ben = db.sidebar("ben").unwrap().unwrap();
    assert!(ben.friend_requests.is_empty());
    assert!(ben.friends.is_empty());
}

#[test]
fn friend_request_to_unknown_user_is_refused() {
    let db = db();
    seed_users(&db, &["ava"]);
    assert!(!db.add_friend_request("ghost", "ava").unwrap());
}

#[test]
fn sender_is_delivered_at_creation() {
    let db = db();
    let id = db
        .insert_message(MessageKind::Group, "ava", None, "hello")
        .unwrap();

    let view = db.message_view(id).unwrap().unwrap();
    assert_eq!(view.delivered_to, vec!["ava"]);
    assert!(view.seen_by.is_empty());
    assert!(view.reactions.is_empty());
    assert!(!view.edited);
}

#[test]
fn seen_is_idempotent() {
    let db = db();
    let id = db
        .insert_message(MessageKind::Group, "ava", None, "hello")
        .unwrap();

    assert_eq!(db.add_seen(id, "ben").unwrap(), Some(true));
    assert_eq!(db.add_seen(id, "ben").unwrap(), Some(false));

    let view = db.message_view(id).unwrap().unwrap();
    assert_eq!(view.seen_by, vec!["ben"]);
}

#[test]
fn updates_on_missing_id_are_noops() {
    let db = db();
    assert!(db.add_seen(999, "ben").unwrap().is_none());
    assert!(db.add_delivered(999, "ben").unwrap().is_none());
    assert!(!db.update_message_text(999, "x").unwrap());
    assert!(!db.delete_message(999).unwrap());
    assert!(db.add_reaction(999, "ben", "👍").unwrap().is_none());
    assert!(db.remove_reaction(999, "ben", "👍").unwrap().is_none());
}

#[test]
fn empty_reaction_sets_are_pruned() {
    let db = db();
    let id = db
        .insert_message(MessageKind::Group, "ava", None, "hello")
        .unwrap();

    let map = db.add_reaction(id, "ben", "👍").unwrap().unwrap();
    assert_eq!(map.get("👍").unwrap(), &vec!["ben".to_string()]);

    let map = db.remove_reaction(id, "ben", "👍").unwrap().unwrap();
    assert!(!map.contains_key("👍"));
}

#[test]
fn reaction_users_are_deduplicated() {
    let db = db();
    let id = db
        .insert_message(MessageKind::Group, "ava", None, "hello")
        .unwrap();

    db.add_reaction(id, "ben", "🔥").unwrap();
    let map = db.add_reaction(id, "ben", "🔥").unwrap().unwrap();
    assert_eq!(map.get("🔥").unwrap().len(), 1);
}

#[test]
fn recent_group_messages_are_ascending_and_capped() {
    let db = db();
    for i in 0..5 {
        db.insert_message(MessageKind::Group, "ava", None, &format!("msg {i}"))
            .unwrap();
    }

    let views = db.recent_group_messages(3).unwrap();
    assert_eq!(views.len(), 3);
    // most recent 3, oldest first
    assert_eq!(views[0].text, "msg 2");
    assert_eq!(views[2].text, "msg 4");
    assert!(views.windows(2).all(|w| w[0].id < w[1].id));
}

#[test]
fn dm_history_covers_both_directions() {
    let db = db();
    db.insert_message(MessageKind::Dm, "ava", Some("ben"), "hi ben")
        .unwrap();
    db.insert_message(MessageKind::Dm, "ben", Some("ava"), "hi ava")
        .unwrap();
    db.insert_message(MessageKind::Dm, "ava", Some("cleo"), "hi cleo")
        .unwrap();

    let views = db.direct_message_history("ava", "ben", 100).unwrap();
    assert_eq!(views.len(), 2);
    assert_eq!(views[0].text, "hi ben");
    assert_eq!(views[1].text, "hi ava");
}

#[test]
fn delete_cascades_side_tables() {
    let db = db();
    let id = db
        .insert_message(MessageKind::Group, "ava", None, "hello")
        .unwrap();
    db.add_seen(id, "ben").unwrap();
    db.add_reaction(id, "ben", "👍").unwrap();

    assert!(db.delete_message(id).unwrap());
    assert!(db.message_view(id).unwrap().is_none());
    // re-adding to the deleted message is an idempotent miss
    assert!(db.add_seen(id, "ben").unwrap().is_none());
}

#[test]
fn edit_marks_message_edited() {
    let db = db();
    let id = db
        .insert_message(MessageKind::Group, "ava", None, "hello")
        .unwrap();

    assert!(db.update_message_text(id, "hello again").unwrap());
    let view = db.message_view(id).unwrap().unwrap();
    assert_eq!(view.text, "hello again");
    assert!(view.edited);
}

#[test]
fn push_tokens_deduplicate() {
    let db = db();
    seed_users(&db, &["ava"]);

    assert!(db.add_push_token("ava", "tok-1").unwrap());
    assert!(db.add_push_token("ava", "tok-1").unwrap());
    assert!(db.add_push_token("ava", "tok-2").unwrap());
    assert!(!db.add_push_token("ghost", "tok-3").unwrap());

    let mut tokens = db.all_push_tokens().unwrap();
    tokens.sort();
    assert_eq!(tokens, vec!["tok-1", "tok-2"]);
}
