use std::sync::Arc;

use futures_util::FutureExt;
use tokio::task::JoinHandle;
use tokio::time::{sleep, Duration};
use tracing::{debug, info, warn};

use crate::cache::{CorrelationCache, CorrelationValue};
use crate::error::Result;
use crate::observer::{BotCommandArgument, BotCommandObservers, SystemObservers};
use crate::poll::{page_count, SearchSession, NEXT_PAGE_INDEX};
use crate::processor::send_search_page;
use crate::telegram::models::{GetUpdates, MessageEntity, PollAnswer, Update, ENTITY_BOT_COMMAND};
use crate::telegram::ChatApi;

pub const UPDATE_RESPONSE_GROUP: &str = "UpdateResponse";

const FETCH_FAILURE_DELAY_SECS: u64 = 2;

pub type UpdateBatch = Arc<Vec<Update>>;

pub struct UpdateDispatcher {
    chat: Arc<dyn ChatApi>,
    system: SystemObservers<UpdateBatch>,
    commands: Arc<BotCommandObservers>,
    contexts: Arc<CorrelationCache>,
    poll_timeout_secs: u64,
}

impl UpdateDispatcher {
    pub async fn new(
        chat: Arc<dyn ChatApi>,
        commands: Arc<BotCommandObservers>,
        contexts: Arc<CorrelationCache>,
        poll_timeout_secs: u64,
    ) -> Arc<Self> {
        let dispatcher = Arc::new(Self {
            chat,
            system: SystemObservers::new(),
            commands,
            contexts,
            poll_timeout_secs,
        });
        dispatcher.register_system_observers().await;
        dispatcher
    }

    async fn register_system_observers(self: &Arc<Self>) {
        let commands = self.commands.clone();
        self.system
            .register(
                Arc::new(move |batch: UpdateBatch| {
                    let commands = commands.clone();
                    async move { process_update_responses(&commands, &batch).await }.boxed()
                }),
                "processUpdateResponses",
                UPDATE_RESPONSE_GROUP,
            )
            .await;

        let chat = self.chat.clone();
        let contexts = self.contexts.clone();
        self.system
            .register(
                Arc::new(move |batch: UpdateBatch| {
                    let chat = chat.clone();
                    let contexts = contexts.clone();
                    async move {
                        for answer in batch.iter().filter_map(|update| update.poll_answer.as_ref()) {
                            process_poll_answer(chat.as_ref(), &contexts, answer).await;
                        }
                    }
                    .boxed()
                }),
                "processPoll",
                UPDATE_RESPONSE_GROUP,
            )
            .await;
    }

    pub async fn detach(&self) {
        for observer_id in self.system.observer_ids(UPDATE_RESPONSE_GROUP).await {
            self.system
                .unregister(UPDATE_RESPONSE_GROUP, &observer_id)
                .await;
        }
        debug!(
            "update observers detached group_present={}",
            self.system.has_group(UPDATE_RESPONSE_GROUP).await
        );
    }

    pub fn spawn(self: Arc<Self>, initial_offset: i64) -> JoinHandle<()> {
        tokio::spawn(async move { self.run_forever(initial_offset).await })
    }

    async fn run_forever(&self, mut offset: i64) {
        match self.chat.get_me().await {
            Ok(me) => info!(
                "telegram dispatcher linked bot_id={} username={}",
                me.id,
                me.username.as_deref().unwrap_or("<unknown>")
            ),
            Err(err) => warn!("telegram getMe failed: {err}"),
        }
        info!("telegram dispatcher started offset={offset}");

        loop {
            match self.poll_once(offset).await {
                Ok(next) => offset = next,
                Err(err) => {
                    warn!("telegram getUpdates failed: {err}");
                    sleep(Duration::from_secs(FETCH_FAILURE_DELAY_SECS)).await;
                }
            }
        }
    }

    pub async fn poll_once(&self, offset: i64) -> Result<i64> {
        let query = GetUpdates {
            offset,
            limit: 0,
            timeout_secs: self.poll_timeout_secs,
        };
        let updates = self.chat.get_updates(&query).await?;
        if updates.is_empty() {
            return Ok(offset);
        }
        let next = next_offset(offset, &updates);
        debug!("telegram fetched {} updates next_offset={next}", updates.len());
        self.system
            .notify_all(UPDATE_RESPONSE_GROUP, Arc::new(updates))
            .await;
        Ok(next)
    }
}

pub fn next_offset(current: i64, batch: &[Update]) -> i64 {
    batch
        .iter()
        .map(|update| update.update_id.saturating_add(1))
        .max()
        .map_or(current, |candidate| candidate.max(current))
}

// The command token runs up to the first whitespace; a trailing `@bot`
// mention is dropped from it.
pub fn parse_command(text: &str) -> Option<(String, String)> {
    let rest = text.trim_start().strip_prefix('/')?;
    let (token, argument) = rest.split_once(char::is_whitespace).unwrap_or((rest, ""));
    let command = token.split_once('@').map_or(token, |(command, _)| command);
    if command.is_empty() {
        return None;
    }
    Some((command.to_owned(), argument.trim().to_owned()))
}

pub fn command_argument(update: &Update) -> Option<BotCommandArgument> {
    let message = update.message.as_ref()?;
    let text = [
        (message.text.as_deref(), &message.entities),
        (message.caption.as_deref(), &message.caption_entities),
    ]
    .into_iter()
    .find_map(|(text, entities)| text.filter(|_| starts_with_command(entities)))?;
    let (command, argument) = parse_command(text)?;
    Some(BotCommandArgument {
        command,
        argument,
        chat_id: message.chat.id,
        message_id: message.message_id,
        update: update.clone(),
    })
}

fn starts_with_command(entities: &[MessageEntity]) -> bool {
    entities
        .first()
        .map(|entity| entity.kind == ENTITY_BOT_COMMAND)
        .unwrap_or(false)
}

async fn process_update_responses(commands: &BotCommandObservers, batch: &[Update]) {
    for update in batch {
        let Some(argument) = command_argument(update) else {
            continue;
        };
        debug!(
            "telegram command /{} chat_id={} message_id={}",
            argument.command, argument.chat_id, argument.message_id
        );
        commands.notify_all(argument).await;
    }
}

async fn process_poll_answer(chat: &dyn ChatApi, contexts: &CorrelationCache, answer: &PollAnswer) {
    if answer.option_ids.first() != Some(&NEXT_PAGE_INDEX) {
        return;
    }
    let session = match contexts.get(&answer.poll_id).await {
        Some(CorrelationValue::SearchPage(session)) => session,
        Some(other) => {
            contexts.put(answer.poll_id.clone(), other).await;
            return;
        }
        None => {
            debug!("no search session for poll {}", answer.poll_id);
            return;
        }
    };
    if session.page >= page_count(session.results.len()) {
        // option 9 of a single full page is a result, not "Next page"
        contexts
            .put(answer.poll_id.clone(), CorrelationValue::SearchPage(session))
            .await;
        return;
    }
    let next = SearchSession {
        page: session.page + 1,
        ..session
    };
    if let Err(err) = send_search_page(chat, contexts, next).await {
        warn!("telegram sendPoll failed: {err}");
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use futures_util::FutureExt;
    use tokio::sync::Mutex;

    use super::{command_argument, next_offset, parse_command, UpdateDispatcher};
    use crate::cache::{CorrelationCache, CorrelationValue};
    use crate::error::BridgeError;
    use crate::observer::{BotCommandArgument, BotCommandObservers};
    use crate::poll::{SearchResult, SearchSession, NEXT_PAGE_TEXT};
    use crate::processor::tests::FakeChat;
    use crate::telegram::models::{Chat, Message, MessageEntity, PollAnswer, Update};

    fn text_update(update_id: i64, text: &str) -> Update {
        Update {
            update_id,
            message: Some(Message {
                message_id: update_id * 10,
                chat: Chat {
                    id: 99,
                    kind: "private".to_owned(),
                },
                text: Some(text.to_owned()),
                entities: vec![MessageEntity {
                    kind: "bot_command".to_owned(),
                    offset: 0,
                    length: 7,
                }],
                ..Message::default()
            }),
            poll_answer: None,
        }
    }

    fn poll_answer_update(update_id: i64, poll_id: &str, option: usize) -> Update {
        Update {
            update_id,
            message: None,
            poll_answer: Some(PollAnswer {
                poll_id: poll_id.to_owned(),
                user: None,
                option_ids: vec![option],
            }),
        }
    }

    fn results(count: usize) -> Vec<SearchResult> {
        (1..=count)
            .map(|index| SearchResult {
                link: format!("/t/{index}"),
                name: format!("result {index}"),
                age: "1 day".to_owned(),
                size: "1 GB".to_owned(),
            })
            .collect()
    }

    #[test]
    fn command_with_argument_and_bare_command_parse() {
        assert_eq!(
            parse_command("/search foo bar"),
            Some(("search".to_owned(), "foo bar".to_owned()))
        );
        assert_eq!(
            parse_command("/search"),
            Some(("search".to_owned(), String::new()))
        );
    }

    #[test]
    fn mention_is_stripped_and_non_commands_are_rejected() {
        assert_eq!(
            parse_command("/search@aria_bot  ubuntu iso "),
            Some(("search".to_owned(), "ubuntu iso".to_owned()))
        );
        assert_eq!(
            parse_command("/byFile@aria_bot"),
            Some(("byFile".to_owned(), String::new()))
        );
        assert_eq!(parse_command("search foo"), None);
        assert_eq!(parse_command("/ foo"), None);
    }

    #[test]
    fn command_token_keeps_underscores_and_digits() {
        assert_eq!(
            parse_command("/search_all foo"),
            Some(("search_all".to_owned(), "foo".to_owned()))
        );
        assert_eq!(
            parse_command("/search2 foo"),
            Some(("search2".to_owned(), "foo".to_owned()))
        );
        assert_eq!(
            parse_command("/search_all@aria_bot foo"),
            Some(("search_all".to_owned(), "foo".to_owned()))
        );
        assert_eq!(parse_command("/@aria_bot foo"), None);
    }

    #[test]
    fn cursor_advances_past_highest_id_and_never_regresses() {
        let batch = vec![text_update(7, "/a"), text_update(12, "/b"), text_update(9, "/c")];
        assert_eq!(next_offset(5, &batch), 13);
        assert_eq!(next_offset(13, &[]), 13);
        // a stale batch below the cursor must not pull it back
        assert_eq!(next_offset(40, &batch), 40);

        let mut offset = 0;
        for batch in [vec![text_update(1, "/a")], vec![], vec![text_update(2, "/b")]] {
            let next = next_offset(offset, &batch);
            assert!(next >= offset);
            offset = next;
        }
        assert_eq!(offset, 3);
    }

    #[test]
    fn caption_command_is_used_when_text_has_none() {
        let update = Update {
            update_id: 3,
            message: Some(Message {
                message_id: 30,
                chat: Chat {
                    id: 5,
                    kind: "group".to_owned(),
                },
                caption: Some("/byFile".to_owned()),
                caption_entities: vec![MessageEntity {
                    kind: "bot_command".to_owned(),
                    offset: 0,
                    length: 7,
                }],
                ..Message::default()
            }),
            poll_answer: None,
        };
        let argument = command_argument(&update).expect("caption command");
        assert_eq!(argument.command, "byFile");
        assert_eq!(argument.argument, "");
        assert_eq!(argument.chat_id, 5);
        assert_eq!(argument.message_id, 30);

        let mut plain = text_update(4, "hello there");
        if let Some(message) = plain.message.as_mut() {
            message.entities.clear();
        }
        assert!(command_argument(&plain).is_none());
    }

    #[tokio::test]
    async fn poll_once_fans_commands_out_and_advances_cursor() {
        let chat = Arc::new(FakeChat::default());
        chat.updates.lock().await.extend([
            Ok(vec![text_update(20, "/search ubuntu"), text_update(21, "/byMagnet")]),
            Err(BridgeError::Transport("connection reset".to_owned())),
            Ok(Vec::new()),
        ]);
        let commands = Arc::new(BotCommandObservers::new());
        let seen = Arc::new(Mutex::new(Vec::new()));
        let seen_in_handler = seen.clone();
        commands
            .register(
                Arc::new(move |argument: BotCommandArgument| {
                    let seen = seen_in_handler.clone();
                    async move {
                        seen.lock()
                            .await
                            .push((argument.command, argument.argument));
                    }
                    .boxed()
                }),
                "recorder",
            )
            .await;
        let dispatcher = UpdateDispatcher::new(
            chat.clone(),
            commands,
            Arc::new(CorrelationCache::new()),
            30,
        )
        .await;

        let offset = dispatcher.poll_once(0).await.expect("first batch");
        assert_eq!(offset, 22);
        assert!(dispatcher.poll_once(offset).await.is_err());
        assert_eq!(dispatcher.poll_once(offset).await.expect("empty batch"), 22);

        dispatcher.detach().await;
        chat.updates
            .lock()
            .await
            .push(Ok(vec![text_update(30, "/search later")]));
        assert_eq!(dispatcher.poll_once(22).await.expect("late batch"), 31);

        assert_eq!(
            *seen.lock().await,
            vec![
                ("search".to_owned(), "ubuntu".to_owned()),
                ("byMagnet".to_owned(), String::new()),
            ]
        );
        let queries = chat.queries.lock().await;
        assert_eq!(queries[0].offset, 0);
        assert_eq!(queries[1].offset, 22);
        assert!(queries.iter().all(|query| query.limit == 0 && query.timeout_secs == 30));
    }

    #[tokio::test]
    async fn next_page_answer_sends_following_page_and_reparks_session() {
        let chat = Arc::new(FakeChat::default());
        let contexts = Arc::new(CorrelationCache::new());
        contexts
            .put(
                "poll-0",
                CorrelationValue::SearchPage(SearchSession {
                    chat_id: 99,
                    message_id: 10,
                    results: results(20),
                    page: 1,
                }),
            )
            .await;
        chat.updates.lock().await.extend([
            Ok(vec![poll_answer_update(1, "poll-0", 3)]),
            Ok(vec![poll_answer_update(2, "poll-0", 9)]),
        ]);
        let dispatcher = UpdateDispatcher::new(
            chat.clone(),
            Arc::new(BotCommandObservers::new()),
            contexts.clone(),
            30,
        )
        .await;

        // a regular option leaves the session parked
        dispatcher.poll_once(0).await.expect("first batch");
        assert!(chat.polls.lock().await.is_empty());
        assert_eq!(contexts.len().await, 1);

        dispatcher.poll_once(2).await.expect("second batch");
        let polls = chat.polls.lock().await;
        assert_eq!(polls.len(), 1);
        assert_eq!(polls[0].question, "Page 2 from 3");
        assert_eq!(polls[0].options[0], "result 10 1 GB 1 day");
        assert_eq!(polls[0].options[9], NEXT_PAGE_TEXT);
        assert_eq!(polls[0].reply_to_message_id, Some(10));

        assert!(contexts.get("poll-0").await.is_none());
        drop(polls);
        match contexts.get("poll-1").await {
            Some(CorrelationValue::SearchPage(session)) => assert_eq!(session.page, 2),
            other => panic!("unexpected cache entry: {other:?}"),
        }
    }

    #[tokio::test]
    async fn tenth_option_of_single_page_is_not_next_page() {
        let chat = Arc::new(FakeChat::default());
        let contexts = Arc::new(CorrelationCache::new());
        contexts
            .put(
                "poll-0",
                CorrelationValue::SearchPage(SearchSession {
                    chat_id: 99,
                    message_id: 10,
                    results: results(10),
                    page: 1,
                }),
            )
            .await;
        chat.updates
            .lock()
            .await
            .push(Ok(vec![poll_answer_update(1, "poll-0", 9)]));
        let dispatcher = UpdateDispatcher::new(
            chat.clone(),
            Arc::new(BotCommandObservers::new()),
            contexts.clone(),
            30,
        )
        .await;

        dispatcher.poll_once(0).await.expect("batch");
        assert!(chat.polls.lock().await.is_empty());
        assert!(matches!(
            contexts.get("poll-0").await,
            Some(CorrelationValue::SearchPage(_))
        ));
    }
}
