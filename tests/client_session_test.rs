//! End to end tests driving a chat session against a running server

mod test_utils;

#[cfg(test)]
mod tests {
    use studychat::ai::Provider;
    use studychat::client::{
        AttachmentRequest, ChatSession, HttpTransport, ProviderConfig, SessionStatus, TurnOutcome,
        spawn_attachment_extraction,
    };
    use studychat::extract::DocumentSource;

    use crate::test_utils::{openai_sse, spawn_app, test_app, test_config};

    /// Tests a full turn with an attachment reaches the provider and
    /// the reply lands in the transcript
    #[tokio::test]
    async fn it_runs_a_turn_with_context() {
        let mut upstream = mockito::Server::new_async().await;
        let mock = upstream
            .mock("POST", "/v1/chat/completions")
            .match_body(mockito::Matcher::Regex(
                "--- Attached Document: glossary.txt ---".to_string(),
            ))
            .with_status(200)
            .with_header("content-type", "text/event-stream")
            .with_body(openai_sse(&["ATP is ", "the energy currency."]))
            .create();

        let base_url = spawn_app(test_app(test_config(&upstream.url()))).await;
        let transport = HttpTransport::new(&base_url);
        let settings = ProviderConfig::new(Provider::OpenAi, "sk-test");

        let mut session = ChatSession::new();
        let (updates_tx, mut updates) = tokio::sync::mpsc::unbounded_channel();
        spawn_attachment_extraction(
            vec![AttachmentRequest::upload(DocumentSource::File {
                name: "glossary.txt".to_string(),
                bytes: b"ATP: adenosine triphosphate".to_vec(),
            })],
            updates_tx,
        );
        let update = updates.recv().await.unwrap();
        assert!(session.apply_update(update).is_empty());

        let outcome = session
            .run_turn(&transport, "What is ATP?", &settings, |_| {})
            .await
            .unwrap();

        mock.assert();
        assert_eq!(outcome, TurnOutcome::Completed);
        assert_eq!(session.status(), SessionStatus::Idle);
        assert_eq!(
            session.transcript().last().unwrap().text(),
            "ATP is the energy currency."
        );
    }

    /// Tests a rejected key surfaces as an error without losing history
    #[tokio::test]
    async fn it_surfaces_provider_rejection() {
        let mut upstream = mockito::Server::new_async().await;
        let _mock = upstream
            .mock("POST", "/v1/messages")
            .with_status(401)
            .with_body(r#"{"type":"error","error":{"type":"authentication_error","message":"invalid x-api-key"}}"#)
            .create();

        let base_url = spawn_app(test_app(test_config(&upstream.url()))).await;
        let transport = HttpTransport::new(&base_url);
        let settings = ProviderConfig::new(Provider::Anthropic, "bad-key");

        let mut session = ChatSession::new();
        let outcome = session
            .run_turn(&transport, "Hello", &settings, |_| {})
            .await
            .unwrap();

        assert_eq!(outcome, TurnOutcome::Failed("invalid x-api-key".to_string()));
        assert_eq!(session.status(), SessionStatus::Error);
        assert_eq!(session.transcript().len(), 1);

        session.acknowledge_error();
        assert_eq!(session.status(), SessionStatus::Idle);
    }
}
