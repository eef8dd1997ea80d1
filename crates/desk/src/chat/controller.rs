use pumpdesk_llm::{
    ProviderEventStream, ProviderStreamHandle, StreamEventMapped, StreamEventPayload, StreamTarget,
};
use tokio::sync::{mpsc, watch};

use crate::chat::error::ChatError;
use crate::chat::events::{ChatCommand, ChatSnapshot, IgnoreReason, SubmitOutcome};
use crate::chat::message::{
    Message, MessageId, MessageIdAllocator, SessionGeneration, TurnId, TurnOutcome, TurnState,
    TurnTarget, TurnTransition,
};
use crate::chat::session::SessionSlot;
use crate::chat::transcript::TranscriptStore;
use crate::content::{
    RESET_GREETING, SESSION_INIT_ERROR, STREAM_APOLOGY, WELCOME_GREETING, quick_action,
};

/// Coordinator-level stream metadata kept outside the transcript.
struct ActiveTurn {
    target: TurnTarget,
    placeholder_id: MessageId,
    buffer: String,
    stream: ProviderEventStream,
}

/// Single writer for the transcript, the loading flag and the session slot.
///
/// All mutation happens on `&mut self`, either from a command or from one event of the
/// active stream. [`ChatController::run`] multiplexes both sources on one task.
pub struct ChatController {
    sessions: SessionSlot,
    transcript: TranscriptStore,
    ids: MessageIdAllocator,
    turn_state: TurnState,
    active_turn: Option<ActiveTurn>,
    next_turn_id: u64,
    snapshots: watch::Sender<ChatSnapshot>,
}

impl ChatController {
    pub fn new(sessions: SessionSlot) -> Self {
        let mut ids = MessageIdAllocator::new();
        let transcript = TranscriptStore::new(Message::bot(ids.alloc(), WELCOME_GREETING));
        let (snapshots, _) = watch::channel(ChatSnapshot {
            generation: sessions.generation(),
            epoch: transcript.epoch(),
            messages: transcript.snapshot(),
            loading: false,
        });

        Self {
            sessions,
            transcript,
            ids,
            turn_state: TurnState::Idle,
            active_turn: None,
            next_turn_id: 1,
            snapshots,
        }
    }

    pub fn subscribe(&self) -> watch::Receiver<ChatSnapshot> {
        self.snapshots.subscribe()
    }

    pub fn snapshot(&self) -> ChatSnapshot {
        ChatSnapshot {
            generation: self.sessions.generation(),
            epoch: self.transcript.epoch(),
            messages: self.transcript.snapshot(),
            loading: self.is_loading(),
        }
    }

    pub fn transcript(&self) -> &TranscriptStore {
        &self.transcript
    }

    pub fn turn_state(&self) -> &TurnState {
        &self.turn_state
    }

    pub fn generation(&self) -> SessionGeneration {
        self.sessions.generation()
    }

    pub fn is_loading(&self) -> bool {
        self.turn_state.is_busy()
    }

    /// Creates the first session. A failure leaves one error-flagged bot message.
    pub fn mount(&mut self) {
        self.open_session("mount");
        self.publish();
    }

    pub fn send(&mut self, text: &str) -> SubmitOutcome {
        let content = text.trim();
        if content.is_empty() {
            return SubmitOutcome::Ignored(IgnoreReason::EmptyInput);
        }

        if self.turn_state.is_busy() {
            // One reply at a time; the input is disabled while loading anyway.
            tracing::debug!("ignoring submit while a turn is in flight");
            return SubmitOutcome::Ignored(IgnoreReason::TurnInProgress);
        }

        if !self.sessions.is_live() {
            tracing::debug!(
                generation = self.sessions.generation().0,
                "ignoring submit without a live session"
            );
            return SubmitOutcome::Ignored(IgnoreReason::NoSession);
        }

        let target = TurnTarget::new(self.sessions.generation(), TurnId::new(self.next_turn_id));
        // Reserve the turn id immediately so later submissions never reuse a target.
        self.next_turn_id = self.next_turn_id.saturating_add(1);

        if let Err(rejection) = self.apply_transition(TurnTransition::Begin(target)) {
            tracing::warn!(?rejection, "turn rejected by state machine");
            return SubmitOutcome::Ignored(IgnoreReason::TurnInProgress);
        }

        let user_message_id = self.ids.alloc();
        if let Err(error) = self
            .transcript
            .append(Message::user(user_message_id, content))
        {
            self.abort_turn_before_stream(target, error);
            return SubmitOutcome::Started(target);
        }

        let placeholder_id = self.ids.alloc();
        if let Err(error) = self
            .transcript
            .append(Message::bot_placeholder(placeholder_id))
        {
            self.abort_turn_before_stream(target, error);
            return SubmitOutcome::Started(target);
        }

        if let Err(rejection) = self.apply_transition(TurnTransition::OpenStream(target)) {
            tracing::debug!(?rejection, "stream open transition rejected");
        }
        self.publish();

        tracing::info!(
            generation = target.generation.0,
            turn = target.turn.0,
            model_id = %self.sessions.config().model_id,
            "opening reply stream"
        );

        let stream_result = match self.sessions.current() {
            Some(session) => session.send_streaming(Self::chat_target_to_provider(target), text),
            None => {
                self.finish_turn(
                    target,
                    TurnOutcome::Failed("session dropped before stream open".to_string()),
                );
                return SubmitOutcome::Started(target);
            }
        };

        match stream_result {
            Ok(handle) => self.spawn_stream_pipeline(target, placeholder_id, handle),
            Err(error) => {
                // Without a stream there is no event to finish the turn, so do it here.
                self.finish_turn(target, TurnOutcome::Failed(error.to_string()));
                return SubmitOutcome::Started(target);
            }
        }

        SubmitOutcome::Started(target)
    }

    pub fn quick_action(&mut self, index: usize) -> SubmitOutcome {
        match quick_action(index) {
            Some(action) => self.send(action.query),
            None => SubmitOutcome::Ignored(IgnoreReason::UnknownQuickAction),
        }
    }

    /// Abandons the in-flight reply. The placeholder keeps the text received so far.
    pub fn stop(&mut self) -> bool {
        let Some(target) = self.active_turn.as_ref().map(|turn| turn.target) else {
            return false;
        };

        self.finish_turn(target, TurnOutcome::Abandoned);
        true
    }

    /// Replaces the session and the transcript.
    ///
    /// The in-flight turn, if any, is abandoned first: its stream is cancelled and any
    /// event that still carries its target is dropped by the generation check.
    pub fn reset(&mut self) {
        if let Some(mut turn) = self.active_turn.take() {
            tracing::info!(
                generation = turn.target.generation.0,
                turn = turn.target.turn.0,
                "abandoning in-flight turn on reset"
            );
            turn.stream.cancel();
        }
        if let Err(rejection) = self.apply_transition(TurnTransition::ResetToIdle) {
            tracing::debug!(?rejection, "reset transition rejected");
        }

        self.transcript
            .reset(Message::bot(self.ids.alloc(), RESET_GREETING));
        self.open_session("reset");
        self.publish();
    }

    /// Waits for the next event of the active turn.
    ///
    /// Returns `None` when no turn is in flight. A stream that closes without a terminal
    /// event is reported as an error event for its target.
    pub async fn next_stream_event(&mut self) -> Option<StreamEventMapped> {
        let turn = self.active_turn.as_mut()?;
        Some(Self::recv_turn_event(turn).await)
    }

    /// Consumes events until the active turn finalizes.
    pub async fn drive_turn(&mut self) {
        while let Some(event) = self.next_stream_event().await {
            self.apply_stream_event(event);
        }
    }

    /// Applies one provider event. Returns whether the transcript changed.
    pub fn apply_stream_event(&mut self, event: StreamEventMapped) -> bool {
        let target = Self::provider_target_to_chat(event.target);

        if !self.stream_event_is_current(target) {
            // Strict target equality keeps chunks of an abandoned turn out of the new transcript.
            tracing::debug!(
                generation = target.generation.0,
                turn = target.turn.0,
                "discarding stale stream event"
            );
            return false;
        }

        match event.payload {
            StreamEventPayload::Delta(chunk) => self.apply_chunk(target, &chunk),
            StreamEventPayload::Done => {
                self.finish_turn(target, TurnOutcome::Completed);
                true
            }
            StreamEventPayload::Error(message) => {
                self.finish_turn(target, TurnOutcome::Failed(message));
                true
            }
        }
    }

    /// Event loop: commands and stream events are handled one at a time on this task.
    pub async fn run(mut self, mut commands: mpsc::UnboundedReceiver<ChatCommand>) {
        loop {
            tokio::select! {
                command = commands.recv() => {
                    match command {
                        Some(ChatCommand::Quit) | None => break,
                        Some(command) => self.handle_command(command),
                    }
                }
                event = Self::wait_turn_event(&mut self.active_turn) => {
                    self.apply_stream_event(event);
                }
            }
        }

        if let Some(mut turn) = self.active_turn.take() {
            turn.stream.cancel();
        }
        tracing::debug!("chat controller stopped");
    }

    pub fn handle_command(&mut self, command: ChatCommand) {
        match command {
            ChatCommand::Send(text) => {
                self.send(&text);
            }
            ChatCommand::QuickAction(index) => {
                self.quick_action(index);
            }
            ChatCommand::Stop => {
                self.stop();
            }
            ChatCommand::Reset => self.reset(),
            ChatCommand::Quit => {}
        }
    }

    fn apply_chunk(&mut self, target: TurnTarget, chunk: &str) -> bool {
        if chunk.is_empty() {
            return false;
        }

        let Some(turn) = self.active_turn.as_mut() else {
            return false;
        };

        turn.buffer.push_str(chunk);
        let changed = self.transcript.update_by_id(turn.placeholder_id, &turn.buffer);
        if let Err(rejection) = self.apply_transition(TurnTransition::FirstChunk(target)) {
            tracing::debug!(?rejection, "chunk transition rejected");
        }

        if changed {
            self.publish();
        }
        changed
    }

    fn spawn_stream_pipeline(
        &mut self,
        target: TurnTarget,
        placeholder_id: MessageId,
        handle: ProviderStreamHandle,
    ) {
        tokio::spawn(handle.worker);
        self.active_turn = Some(ActiveTurn {
            target,
            placeholder_id,
            buffer: String::new(),
            stream: handle.stream,
        });
    }

    fn finish_turn(&mut self, target: TurnTarget, outcome: TurnOutcome) {
        let placeholder_id = match self.active_turn.take() {
            Some(mut turn) if turn.target == target => {
                if outcome == TurnOutcome::Abandoned {
                    turn.stream.cancel();
                }
                Some(turn.placeholder_id)
            }
            Some(turn) => {
                self.active_turn = Some(turn);
                return;
            }
            None => self.transcript.pending().map(|message| message.id),
        };

        if let Some(placeholder_id) = placeholder_id {
            self.transcript.finalize_by_id(placeholder_id);
        }

        if let TurnOutcome::Failed(message) = &outcome {
            let error = ChatError::Stream {
                stage: "finish-turn",
                message: message.clone(),
            };
            tracing::warn!(
                generation = target.generation.0,
                turn = target.turn.0,
                error = %error,
                "reply stream failed"
            );
            self.append_error_message(STREAM_APOLOGY);
        }

        if let Err(rejection) = self.apply_transition(TurnTransition::Finish {
            target,
            outcome: outcome.clone(),
        }) {
            tracing::warn!(?rejection, "turn finish rejected by state machine");
            self.turn_state = TurnState::Idle;
        }

        tracing::info!(
            generation = target.generation.0,
            turn = target.turn.0,
            ?outcome,
            "turn finalized"
        );
        self.publish();
    }

    fn abort_turn_before_stream(&mut self, target: TurnTarget, error: ChatError) {
        tracing::error!(error = %error, "transcript rejected turn");
        self.finish_turn(target, TurnOutcome::Failed(error.to_string()));
    }

    fn open_session(&mut self, stage: &'static str) {
        if let Err(error) = self.sessions.replace() {
            tracing::error!(
                stage,
                generation = self.sessions.generation().0,
                error = %error,
                "failed to initialize chat session"
            );
            self.append_error_message(SESSION_INIT_ERROR);
        }
    }

    fn append_error_message(&mut self, text: &str) {
        let message = Message::bot_error(self.ids.alloc(), text);
        if let Err(error) = self.transcript.append(message) {
            tracing::error!(error = %error, "failed to append error message");
        }
    }

    fn apply_transition(
        &mut self,
        transition: TurnTransition,
    ) -> Result<(), crate::chat::message::TurnTransitionRejection> {
        self.turn_state = self.turn_state.apply(transition)?;
        Ok(())
    }

    fn stream_event_is_current(&self, target: TurnTarget) -> bool {
        target.generation == self.sessions.generation()
            && self.turn_state.accepts_stream_event(target)
            && self
                .active_turn
                .as_ref()
                .is_some_and(|turn| turn.target == target)
    }

    fn publish(&self) {
        self.snapshots.send_replace(self.snapshot());
    }

    async fn recv_turn_event(turn: &mut ActiveTurn) -> StreamEventMapped {
        match turn.stream.recv().await {
            Some(event) => event,
            None => StreamEventMapped::error(
                Self::chat_target_to_provider(turn.target),
                "provider stream ended before a terminal event",
            ),
        }
    }

    async fn wait_turn_event(active_turn: &mut Option<ActiveTurn>) -> StreamEventMapped {
        match active_turn.as_mut() {
            Some(turn) => Self::recv_turn_event(turn).await,
            None => futures::future::pending().await,
        }
    }

    fn chat_target_to_provider(target: TurnTarget) -> StreamTarget {
        StreamTarget::new(target.generation.0, target.turn.0)
    }

    fn provider_target_to_chat(target: StreamTarget) -> TurnTarget {
        TurnTarget::new(SessionGeneration::new(target.session), TurnId::new(target.turn))
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;
    use std::sync::atomic::Ordering;
    use std::time::Duration;

    use pumpdesk_llm::SessionConfig;
    use tokio::sync::Notify;

    use super::*;
    use crate::chat::message::{MessageStatus, Sender};
    use crate::chat::testing::{ScriptState, ScriptedProvider, Step, slot_for};
    use crate::content::QUICK_ACTIONS;

    fn mounted(provider: Arc<ScriptedProvider>) -> ChatController {
        let mut controller = ChatController::new(slot_for(provider));
        controller.mount();
        controller
    }

    fn texts(controller: &ChatController) -> Vec<String> {
        controller
            .transcript()
            .snapshot()
            .iter()
            .map(|message| message.text.clone())
            .collect()
    }

    fn pending_count(controller: &ChatController) -> usize {
        controller
            .transcript()
            .snapshot()
            .iter()
            .filter(|message| message.is_pending())
            .count()
    }

    #[tokio::test]
    async fn blank_input_leaves_transcript_untouched() {
        let (provider, state) = ScriptedProvider::chunks(&["unused"]);
        let mut controller = mounted(provider);
        let before = controller.snapshot();

        assert_eq!(
            controller.send("   "),
            SubmitOutcome::Ignored(IgnoreReason::EmptyInput)
        );
        assert_eq!(controller.snapshot(), before);
        assert!(!controller.is_loading());
        assert!(state.requests().is_empty());
    }

    #[tokio::test]
    async fn streamed_chunks_build_one_reply() {
        let (provider, state) = ScriptedProvider::chunks(&["Dạ ", "bơm ly tâm ", "rất phù hợp."]);
        let mut controller = mounted(provider);

        let outcome = controller.send("Hỏi về bơm ly tâm");
        assert!(outcome.is_started());
        assert!(controller.is_loading());
        assert!(controller.snapshot().awaiting_first_chunk());

        controller.drive_turn().await;

        let messages = controller.transcript().snapshot();
        assert_eq!(messages.len(), 3);
        assert_eq!(messages[1].sender, Sender::User);
        assert_eq!(messages[1].text, "Hỏi về bơm ly tâm");
        assert_eq!(messages[2].sender, Sender::Bot);
        assert_eq!(messages[2].text, "Dạ bơm ly tâm rất phù hợp.");
        assert_eq!(messages[2].status, MessageStatus::Final);
        assert!(!messages[2].is_error);
        assert!(!controller.is_loading());
        assert_eq!(state.requests(), vec!["Hỏi về bơm ly tâm".to_string()]);
    }

    #[tokio::test]
    async fn displayed_reply_only_grows_by_appending() {
        let (provider, _state) = ScriptedProvider::chunks(&["Bơm ", "", "màng ", "khí nén"]);
        let mut controller = mounted(provider);
        controller.send("Bơm màng là gì?");

        let mut shown = String::new();
        while let Some(event) = controller.next_stream_event().await {
            controller.apply_stream_event(event);
            assert!(pending_count(&controller) <= 1);

            let current = controller
                .transcript()
                .last()
                .map(|message| message.text.clone())
                .unwrap_or_default();
            assert!(current.starts_with(&shown), "{current:?} dropped {shown:?}");
            shown = current;
        }

        assert_eq!(shown, "Bơm màng khí nén");
        assert_eq!(pending_count(&controller), 0);
    }

    fn assert_extends(previous: &[Message], current: &[Message], added: usize) {
        assert_eq!(current.len(), previous.len() + added);
        assert_eq!(&current[..previous.len()], previous);
    }

    #[tokio::test]
    async fn every_turn_keeps_the_earlier_transcript_as_prefix() {
        let (provider, state) = ScriptedProvider::turns(vec![
            vec![Step::Chunk("Dạ "), Step::Chunk("có ạ.")],
            vec![Step::Chunk("Xin "), Step::Fail("connection reset")],
        ]);
        let mut controller = mounted(provider);
        let mut previous = controller.transcript().snapshot();

        controller.send("Có bơm màng không?");
        controller.drive_turn().await;
        let current = controller.transcript().snapshot();
        assert_extends(&previous, &current, 2);
        assert_eq!(current[2].text, "Dạ có ạ.");
        previous = current;

        controller.send("Bơm ly tâm giá bao nhiêu?");
        controller.drive_turn().await;
        let current = controller.transcript().snapshot();
        assert_extends(&previous, &current, 3);
        assert_eq!(current[4].text, "Xin ");
        assert!(current[5].is_error);
        previous = current;

        state.fail_open.store(true, Ordering::SeqCst);
        controller.send("Gửi catalog giúp em");
        let current = controller.transcript().snapshot();
        assert_extends(&previous, &current, 3);
        assert!(current.iter().all(|message| !message.is_pending()));
        assert!(!controller.is_loading());
    }

    #[tokio::test]
    async fn empty_chunk_does_not_change_transcript() {
        let (provider, _state) = ScriptedProvider::chunks(&[""]);
        let mut controller = mounted(provider);
        controller.send("xin chào");

        let event = controller.next_stream_event().await.unwrap();
        assert!(!controller.apply_stream_event(event));
        let target = TurnTarget::new(controller.generation(), TurnId::new(1));
        assert_eq!(controller.turn_state(), &TurnState::AwaitingStream(target));
    }

    #[tokio::test]
    async fn failure_mid_stream_keeps_partial_reply_and_apologizes() {
        let (provider, _state) = ScriptedProvider::new(vec![
            Step::Chunk("Dạ "),
            Step::Fail("connection reset"),
        ]);
        let mut controller = mounted(provider);
        controller.send("Giá bơm?");
        controller.drive_turn().await;

        let messages = controller.transcript().snapshot();
        assert_eq!(messages.len(), 4);
        assert_eq!(messages[2].text, "Dạ ");
        assert!(!messages[2].is_error);
        assert!(!messages[2].is_pending());
        assert_eq!(messages[3].text, STREAM_APOLOGY);
        assert!(messages[3].is_error);
        assert!(!controller.is_loading());
    }

    #[tokio::test]
    async fn stream_that_closes_early_is_a_failure() {
        let (provider, _state) = ScriptedProvider::new(vec![Step::Chunk("Dạ"), Step::Hangup]);
        let mut controller = mounted(provider);
        controller.send("Bảo hành?");
        controller.drive_turn().await;

        let messages = controller.transcript().snapshot();
        assert_eq!(messages.len(), 4);
        assert_eq!(messages[2].text, "Dạ");
        assert!(messages[3].is_error);
        assert!(!controller.is_loading());
    }

    #[tokio::test]
    async fn open_failure_leaves_empty_placeholder_and_apology() {
        let (provider, state) = ScriptedProvider::chunks(&["unused"]);
        let mut controller = mounted(provider);
        state.fail_open.store(true, Ordering::SeqCst);

        assert!(controller.send("Catalog?").is_started());

        let messages = controller.transcript().snapshot();
        assert_eq!(messages.len(), 4);
        assert_eq!(messages[2].text, "");
        assert!(!messages[2].is_pending());
        assert_eq!(messages[3].text, STREAM_APOLOGY);
        assert!(!controller.is_loading());
        assert!(controller.next_stream_event().await.is_none());

        state.fail_open.store(false, Ordering::SeqCst);
        controller.send("Catalog?");
        controller.drive_turn().await;
        assert_eq!(texts(&controller).last().map(String::as_str), Some("unused"));
    }

    #[tokio::test]
    async fn session_creation_failure_on_mount_surfaces_one_error() {
        let (provider, state) = ScriptedProvider::chunks(&["unused"]);
        state.fail_create.store(true, Ordering::SeqCst);
        let controller = mounted(provider);

        let messages = controller.transcript().snapshot();
        assert_eq!(messages.len(), 2);
        assert_eq!(messages[0].text, WELCOME_GREETING);
        assert!(!messages[0].is_error);
        assert_eq!(messages[1].text, SESSION_INIT_ERROR);
        assert!(messages[1].is_error);
        assert!(!controller.is_loading());
    }

    #[tokio::test]
    async fn send_without_session_is_ignored() {
        let (provider, state) = ScriptedProvider::chunks(&["unused"]);
        state.fail_create.store(true, Ordering::SeqCst);
        let mut controller = mounted(provider);
        let before = controller.snapshot();

        assert_eq!(
            controller.send("Có ai không?"),
            SubmitOutcome::Ignored(IgnoreReason::NoSession)
        );
        assert_eq!(controller.snapshot(), before);
        assert!(state.requests().is_empty());
    }

    #[tokio::test]
    async fn unavailable_provider_reports_init_error() {
        let slot = SessionSlot::new(
            Err("missing api key".to_string()),
            SessionConfig::new("gemini-3-pro-preview", "system"),
        );
        let mut controller = ChatController::new(slot);
        controller.mount();

        let messages = controller.transcript().snapshot();
        assert_eq!(messages.len(), 2);
        assert!(messages[1].is_error);
        assert_eq!(controller.generation(), SessionGeneration::new(1));
    }

    #[tokio::test]
    async fn reset_mid_stream_discards_remaining_chunks() {
        let gate = Arc::new(Notify::new());
        let (provider, state) = ScriptedProvider::new(vec![
            Step::Chunk("Dạ "),
            Step::Wait(gate.clone()),
            Step::Chunk("bơm ly tâm "),
            Step::Chunk("rất phù hợp."),
        ]);
        let mut controller = mounted(provider);
        let started = controller.send("Hỏi về bơm ly tâm");
        let SubmitOutcome::Started(old_target) = started else {
            panic!("turn did not start: {started:?}");
        };

        let event = controller.next_stream_event().await.unwrap();
        assert!(controller.apply_stream_event(event));

        controller.reset();
        gate.notify_one();
        for _ in 0..8 {
            tokio::task::yield_now().await;
        }

        assert!(controller.next_stream_event().await.is_none());
        assert_eq!(texts(&controller), vec![RESET_GREETING.to_string()]);
        assert!(!controller.is_loading());
        assert_eq!(controller.transcript().epoch(), 1);
        assert_eq!(state.sessions_created.load(Ordering::SeqCst), 2);

        let stale = StreamEventMapped::delta(
            ChatController::chat_target_to_provider(old_target),
            "bơm ly tâm ",
        );
        assert!(!controller.apply_stream_event(stale));
        let stale_done = StreamEventMapped::done(ChatController::chat_target_to_provider(old_target));
        assert!(!controller.apply_stream_event(stale_done));
        assert_eq!(texts(&controller), vec![RESET_GREETING.to_string()]);
    }

    #[tokio::test]
    async fn send_while_loading_is_ignored() {
        let gate = Arc::new(Notify::new());
        let (provider, state) = ScriptedProvider::new(vec![
            Step::Wait(gate.clone()),
            Step::Chunk("Dạ có ạ."),
        ]);
        let mut controller = mounted(provider);
        controller.send("Câu hỏi thứ nhất");
        let before = controller.snapshot();

        assert_eq!(
            controller.send("Câu hỏi thứ hai"),
            SubmitOutcome::Ignored(IgnoreReason::TurnInProgress)
        );
        assert_eq!(
            controller.quick_action(0),
            SubmitOutcome::Ignored(IgnoreReason::TurnInProgress)
        );
        assert_eq!(controller.snapshot(), before);
        assert_eq!(state.requests().len(), 1);

        gate.notify_one();
        controller.drive_turn().await;
        assert_eq!(texts(&controller).last().map(String::as_str), Some("Dạ có ạ."));
        assert!(controller.send("Câu hỏi thứ hai").is_started());
    }

    #[tokio::test]
    async fn quick_action_sends_its_canned_query() {
        let (provider, state) = ScriptedProvider::chunks(&["Dạ."]);
        let mut controller = mounted(provider);

        assert_eq!(
            controller.quick_action(QUICK_ACTIONS.len()),
            SubmitOutcome::Ignored(IgnoreReason::UnknownQuickAction)
        );
        assert!(controller.quick_action(1).is_started());
        controller.drive_turn().await;

        assert_eq!(state.requests(), vec![QUICK_ACTIONS[1].query.to_string()]);
        assert_eq!(texts(&controller)[1], QUICK_ACTIONS[1].query);
    }

    #[tokio::test]
    async fn stop_keeps_partial_text_without_apology() {
        let gate = Arc::new(Notify::new());
        let (provider, _state) = ScriptedProvider::new(vec![
            Step::Chunk("Dạ "),
            Step::Wait(gate.clone()),
            Step::Chunk("tiếp"),
        ]);
        let mut controller = mounted(provider);
        assert!(!controller.stop());

        controller.send("Hỏi");
        let event = controller.next_stream_event().await.unwrap();
        controller.apply_stream_event(event);

        assert!(controller.stop());
        assert!(!controller.is_loading());
        let messages = controller.transcript().snapshot();
        assert_eq!(messages.len(), 3);
        assert_eq!(messages[2].text, "Dạ ");
        assert!(!messages[2].is_pending());
        assert!(matches!(
            controller.turn_state(),
            TurnState::Finalized {
                outcome: TurnOutcome::Abandoned,
                ..
            }
        ));
    }

    #[tokio::test]
    async fn reset_failure_recovers_on_next_reset() {
        let (provider, state) = ScriptedProvider::chunks(&["Dạ."]);
        let mut controller = mounted(provider);

        state.fail_create.store(true, Ordering::SeqCst);
        controller.reset();
        assert_eq!(
            texts(&controller),
            vec![RESET_GREETING.to_string(), SESSION_INIT_ERROR.to_string()]
        );
        assert_eq!(
            controller.send("Còn đó không?"),
            SubmitOutcome::Ignored(IgnoreReason::NoSession)
        );

        state.fail_create.store(false, Ordering::SeqCst);
        controller.reset();
        assert_eq!(texts(&controller), vec![RESET_GREETING.to_string()]);
        assert_eq!(controller.generation(), SessionGeneration::new(3));
        assert!(controller.send("Còn đó không?").is_started());
    }

    #[tokio::test]
    async fn reset_bumps_epoch_and_reuses_no_message_id() {
        let (provider, _state) = ScriptedProvider::chunks(&["Dạ."]);
        let mut controller = mounted(provider);
        controller.send("Hỏi");
        controller.drive_turn().await;
        let last_before = controller.transcript().last().map(|message| message.id);

        controller.reset();

        let greeting = controller.transcript().last().map(|message| message.id);
        assert!(greeting > last_before);
        assert_eq!(controller.snapshot().epoch, 1);
    }

    #[tokio::test]
    async fn run_loop_handles_commands_and_stream_events() {
        let (provider, state): (_, Arc<ScriptState>) =
            ScriptedProvider::chunks(&["Dạ ", "được ạ."]);
        let controller = mounted(provider);
        let mut snapshots = controller.subscribe();
        let (commands, command_rx) = mpsc::unbounded_channel();
        let task = tokio::spawn(controller.run(command_rx));

        commands
            .send(ChatCommand::Send("Có giao hàng không?".to_string()))
            .unwrap();
        let snapshot = tokio::time::timeout(
            Duration::from_secs(5),
            snapshots.wait_for(|snapshot| !snapshot.loading && snapshot.messages.len() == 3),
        )
        .await
        .expect("reply should finish")
        .expect("controller alive")
        .clone();
        assert_eq!(
            snapshot.last_message().map(|message| message.text.as_str()),
            Some("Dạ được ạ.")
        );

        commands.send(ChatCommand::Reset).unwrap();
        let snapshot = tokio::time::timeout(
            Duration::from_secs(5),
            snapshots.wait_for(|snapshot| snapshot.epoch == 1),
        )
        .await
        .expect("reset should publish")
        .expect("controller alive")
        .clone();
        assert_eq!(snapshot.messages.len(), 1);

        commands.send(ChatCommand::Quit).unwrap();
        task.await.unwrap();
        assert_eq!(state.requests().len(), 1);
    }
}
