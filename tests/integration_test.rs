use content_audit::clients::ChatRequest;
use content_audit::config::{AuditPolicy, Config};
use content_audit::models::{AuditType, JobSnapshot, JobStatus, Verdict};
use content_audit::orchestrator::{JobController, JobKey};
use content_audit::services::sanitize::push_payload;
use content_audit::services::TableStore;
use mockito::{Matcher, Mock, ServerGuard};
use serde_json::json;
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::time::Duration;

const COMMENT_PROMPT: &str = "请审核以下评论内容是否低质，并给出审核结果和低质标签：\n\n";

fn test_config(dir: &Path, api_url: String, item_delay_ms: u64) -> Config {
    let policies: BTreeMap<_, _> = AuditType::ALL
        .iter()
        .map(|&t| {
            let policy = AuditPolicy {
                rate_per_sec: 1000.0,
                bucket_capacity: 100.0,
                concurrency: 1,
                item_delay_ms,
                checkpoint_every: 1,
            };
            (t, policy)
        })
        .collect();
    Config {
        api_url,
        api_key: "test-key".to_string(),
        max_retries: 2,
        backoff_base_ms: 1,
        max_retry_after_secs: 0,
        data_folder: dir.join("data").display().to_string(),
        result_folder: dir.join("result").display().to_string(),
        history_file: dir.join("result/history.json").display().to_string(),
        policies,
        ..Config::default()
    }
}

fn write_dataset(dir: &Path, name: &str, rows: serde_json::Value) -> PathBuf {
    let path = dir.join(name);
    std::fs::write(&path, rows.to_string()).unwrap();
    path
}

fn answer(text: &str, conversation_id: &str) -> String {
    json!({ "answer": text, "conversation_id": conversation_id }).to_string()
}

async fn mock_comment(server: &mut ServerGuard, comment: &str, reply: &str) -> Mock {
    server
        .mock("POST", "/")
        .match_body(Matcher::PartialJson(json!({
            "query": format!("{}{}", COMMENT_PROMPT, comment),
            "user": "audit_system"
        })))
        .with_status(200)
        .with_body(answer(reply, ""))
        .expect(1)
        .create_async()
        .await
}

async fn wait_for(
    controller: &JobController,
    key: &JobKey,
    done: impl Fn(&JobSnapshot) -> bool,
) -> JobSnapshot {
    let deadline = tokio::time::Instant::now() + Duration::from_secs(15);
    loop {
        let snapshot = controller.status(key);
        if done(&snapshot) {
            return snapshot;
        }
        assert!(
            tokio::time::Instant::now() < deadline,
            "等待超时: {:?}",
            snapshot
        );
        tokio::time::sleep(Duration::from_millis(20)).await;
    }
}

async fn wait_terminal(controller: &JobController, key: &JobKey) -> JobSnapshot {
    wait_for(controller, key, |s| s.status.is_terminal()).await
}

#[tokio::test]
async fn test_comment_job_end_to_end() {
    let dir = tempfile::tempdir().unwrap();
    let mut server = mockito::Server::new_async().await;

    let normal = mock_comment(&mut server, "写得真好", "（1）审核结果：正常 （2）低质标签：/").await;
    let low = mock_comment(&mut server, "加微信领红包", "审核结果：低质 低质标签：广告，谩骂").await;
    let failing = server
        .mock("POST", "/")
        .match_body(Matcher::PartialJson(json!({
            "query": format!("{}{}", COMMENT_PROMPT, "服务挂了")
        })))
        .with_status(503)
        .expect(2)
        .create_async()
        .await;

    let controller = JobController::new(test_config(dir.path(), server.url(), 0));
    let key = JobKey::new(AuditType::Comment, "s1");
    let dataset = write_dataset(
        dir.path(),
        "comments.json",
        json!([
            { "评论内容": "写得真好", "作者": "a" },
            { "评论内容": "" },
            { "评论内容": "加微信领红包", "作者": "b" },
            { "评论内容": "服务挂了", "作者": "c" }
        ]),
    );

    let registered = controller.register_dataset(&key, &dataset).await.unwrap();
    assert_eq!(registered.message, "文件上传成功，请点击开始巡检");
    controller.start(&key, None).unwrap();

    let snapshot = wait_terminal(&controller, &key).await;
    normal.assert_async().await;
    low.assert_async().await;
    failing.assert_async().await;

    assert_eq!(snapshot.status, JobStatus::Done);
    // 空行在清洗阶段被丢弃
    assert_eq!(snapshot.total, 3);
    assert_eq!(snapshot.processed, 3);
    assert_eq!(snapshot.progress, 100);
    let stats = &snapshot.statistics;
    assert_eq!(stats.verdict_counts[&Verdict::Normal], 1);
    assert_eq!(stats.verdict_counts[&Verdict::LowQuality], 1);
    assert_eq!(stats.verdict_counts[&Verdict::ProcessingFailed], 1);
    assert_eq!(stats.total(), snapshot.processed);
    assert_eq!(stats.tag_counts["广告"], 1);
    assert_eq!(stats.tag_counts["谩骂"], 1);

    let result_path = controller.result_path(&key).unwrap().expect("结果文件应存在");
    let table = TableStore::load(&result_path).await.unwrap();
    assert_eq!(table.rows[0]["审核结果"], json!("正常"));
    assert_eq!(table.rows[0]["违规标签"], json!("/"));
    assert_eq!(table.rows[1]["违规标签"], json!("广告, 谩骂"));
    assert_eq!(table.rows[2]["审核结果"], json!("处理失败"));
    assert_eq!(table.rows[1]["作者"], json!("b"));

    let history = controller.history().await.unwrap();
    assert_eq!(history.len(), 1);
    assert_eq!(history[0].final_status, JobStatus::Done);
    assert_eq!(history[0].source_filename, "comments.json");
    assert_eq!(history[0].processed_rows, 3);
}

#[tokio::test]
async fn test_pause_and_resume_process_every_row_once() {
    let dir = tempfile::tempdir().unwrap();
    let mut server = mockito::Server::new_async().await;

    let comments: Vec<String> = (1..=5).map(|i| format!("第{}条评论", i)).collect();
    let mut mocks = Vec::new();
    for comment in &comments {
        mocks.push(mock_comment(&mut server, comment, "审核结果：正常").await);
    }

    let controller = JobController::new(test_config(dir.path(), server.url(), 200));
    let key = JobKey::new(AuditType::Comment, "pause");
    let rows: Vec<_> = comments.iter().map(|c| json!({ "评论内容": c })).collect();
    let dataset = write_dataset(dir.path(), "pause.json", json!(rows));
    controller.register_dataset(&key, &dataset).await.unwrap();
    controller.start(&key, None).unwrap();

    wait_for(&controller, &key, |s| s.processed >= 1).await;
    let paused = controller.pause(&key).unwrap();
    assert_eq!(paused.status, JobStatus::Paused);
    assert!(paused.paused);

    // 暂停期间最多还能完成一行正在进行的请求
    tokio::time::sleep(Duration::from_millis(600)).await;
    let frozen = controller.status(&key).processed;
    tokio::time::sleep(Duration::from_millis(600)).await;
    let still = controller.status(&key);
    assert_eq!(still.processed, frozen);
    assert_eq!(still.status, JobStatus::Paused);
    assert!(frozen < 5);

    controller.resume(&key).unwrap();
    let snapshot = wait_terminal(&controller, &key).await;
    assert_eq!(snapshot.status, JobStatus::Done);
    assert_eq!(snapshot.processed, 5);
    for mock in &mocks {
        mock.assert_async().await;
    }
}

#[tokio::test]
async fn test_end_resets_job() {
    let dir = tempfile::tempdir().unwrap();
    let mut server = mockito::Server::new_async().await;
    let _mock = mock_comment(&mut server, "内容", "审核结果：低质 低质标签：灌水").await;

    let controller = JobController::new(test_config(dir.path(), server.url(), 0));
    let key = JobKey::new(AuditType::Comment, "end");
    let dataset = write_dataset(dir.path(), "end.json", json!([{ "评论内容": "内容" }]));
    controller.register_dataset(&key, &dataset).await.unwrap();
    let started = controller.start(&key, None).unwrap();

    let done = wait_terminal(&controller, &key).await;
    assert_eq!(done.status, JobStatus::Done);
    assert_eq!(done.progress, 100);

    // done 状态不可再启动，必须先 end
    assert!(controller.start(&key, None).is_err());
    assert!(controller.register_dataset(&key, &dataset).await.is_err());

    let reset = controller.end(&key).unwrap();
    assert_eq!(reset.status, JobStatus::Idle);
    assert_eq!(reset.progress, 0);
    assert_eq!(reset.processed, 0);
    assert!(reset.statistics.verdict_counts.is_empty());
    assert!(reset.statistics.tag_counts.is_empty());
    assert_ne!(reset.id, started.id);

    // 重置后需要重新上传
    assert!(controller.start(&key, None).is_err());
    assert!(controller.register_dataset(&key, &dataset).await.is_ok());
}

#[tokio::test]
async fn test_missing_column_sets_error() {
    let dir = tempfile::tempdir().unwrap();
    let server = mockito::Server::new_async().await;

    let controller = JobController::new(test_config(dir.path(), server.url(), 0));
    let key = JobKey::new(AuditType::Comment, "bad");
    let dataset = write_dataset(dir.path(), "bad.json", json!([{ "正文": "没有评论列" }]));
    controller.register_dataset(&key, &dataset).await.unwrap();
    controller.start(&key, None).unwrap();

    let snapshot = wait_terminal(&controller, &key).await;
    assert_eq!(snapshot.status, JobStatus::Error);
    assert_eq!(snapshot.message, "文件格式错误：缺少\"评论内容\"列");
    assert_eq!(snapshot.processed, 0);

    // error 在 end 之前不可变
    assert!(controller.pause(&key).is_err());
    assert!(controller.start(&key, None).is_err());

    let history = controller.history().await.unwrap();
    assert_eq!(history.len(), 1);
    assert_eq!(history[0].final_status, JobStatus::Error);
}

#[tokio::test]
async fn test_push_threads_continuation_token() {
    let dir = tempfile::tempdir().unwrap();
    let mut server = mockito::Server::new_async().await;

    // 第一行不带 conversation_id
    let first_body = serde_json::to_string(&ChatRequest::text(push_payload("A", "a"), "PUSH_AUDIT_BOT")).unwrap();
    let first = server
        .mock("POST", "/")
        .match_body(Matcher::Exact(first_body))
        .with_status(200)
        .with_body(answer("审核结果：正常", "c1"))
        .expect(1)
        .create_async()
        .await;
    let second = server
        .mock("POST", "/")
        .match_body(Matcher::PartialJson(json!({
            "query": push_payload("B", "b"),
            "conversation_id": "c1"
        })))
        .with_status(200)
        .with_body(answer("审核结果：低质 低质标签：标题党", "c2"))
        .expect(1)
        .create_async()
        .await;

    let controller = JobController::new(test_config(dir.path(), server.url(), 0));
    let key = JobKey::new(AuditType::Push, "push");
    let dataset = write_dataset(
        dir.path(),
        "push.json",
        json!([{ "标题": "A", "摘要": "a" }, { "标题": "B", "摘要": "b" }]),
    );
    controller.register_dataset(&key, &dataset).await.unwrap();
    controller.start(&key, None).unwrap();

    let snapshot = wait_terminal(&controller, &key).await;
    first.assert_async().await;
    second.assert_async().await;
    assert_eq!(snapshot.status, JobStatus::Done);
    assert_eq!(snapshot.statistics.tag_counts["标题党"], 1);

    let table = TableStore::load(&controller.result_path(&key).unwrap().unwrap())
        .await
        .unwrap();
    assert_eq!(table.rows[1]["低质标签"], json!("标题党"));
}

#[tokio::test]
async fn test_finish_stops_early_and_writes_history() {
    let dir = tempfile::tempdir().unwrap();
    let mut server = mockito::Server::new_async().await;
    let _mock = server
        .mock("POST", "/")
        .with_status(200)
        .with_body(answer("审核结果：正常", ""))
        .expect_at_least(1)
        .create_async()
        .await;

    let controller = JobController::new(test_config(dir.path(), server.url(), 300));
    let key = JobKey::new(AuditType::Brand, "finish");
    let rows: Vec<_> = (0..10).map(|i| json!({ "品牌标题": format!("品牌{}", i) })).collect();
    let dataset = write_dataset(dir.path(), "brand.json", json!(rows));
    controller.register_dataset(&key, &dataset).await.unwrap();
    controller.start(&key, None).unwrap();

    wait_for(&controller, &key, |s| s.processed >= 1).await;
    controller.finish(&key).unwrap();

    let snapshot = wait_terminal(&controller, &key).await;
    assert_eq!(snapshot.status, JobStatus::Done);
    assert!(snapshot.processed < 10);
    assert_eq!(snapshot.statistics.total(), snapshot.processed);

    let result_path = controller.result_path(&key).unwrap().expect("结果文件应存在");
    let table = TableStore::load(&result_path).await.unwrap();
    assert_eq!(table.rows[0]["审核结果"], json!("正常"));
    assert_eq!(table.rows[9]["审核结果"], json!(""));

    let history = controller.history().await.unwrap();
    assert_eq!(history[0].processed_rows, snapshot.processed);
}

async fn mock_cover(server: &mut ServerGuard, image_url: &str, reply: &str) -> Mock {
    server
        .mock("POST", "/")
        .match_body(Matcher::PartialJson(json!({
            "user": "audit_system",
            "upload_mediums": [{ "url": image_url, "type": "image" }]
        })))
        .with_status(200)
        .with_body(answer(reply, ""))
        .expect(1)
        .create_async()
        .await
}

#[tokio::test]
async fn test_cover_job_sends_image_and_masks_untagged_violation() {
    let dir = tempfile::tempdir().unwrap();
    let mut server = mockito::Server::new_async().await;

    let tagged = mock_cover(&mut server, "https://img.test/a.jpg", "（1）审核结果：违规（2）违规标签：色情").await;
    let untagged = mock_cover(&mut server, "https://img.test/b.jpg", "审核结果：违规").await;

    let controller = JobController::new(test_config(dir.path(), server.url(), 0));
    let key = JobKey::new(AuditType::Cover, "cover");
    let dataset = write_dataset(
        dir.path(),
        "cover.json",
        json!([
            { "封面链接": "https://img.test/a.jpg" },
            { "封面链接": "https://img.test/b.jpg" }
        ]),
    );
    controller.register_dataset(&key, &dataset).await.unwrap();
    controller.start(&key, None).unwrap();

    let snapshot = wait_terminal(&controller, &key).await;
    tagged.assert_async().await;
    untagged.assert_async().await;
    assert_eq!(snapshot.status, JobStatus::Done);
    assert_eq!(snapshot.statistics.verdict_counts[&Verdict::Violation], 1);
    assert_eq!(snapshot.statistics.verdict_counts[&Verdict::Normal], 1);

    let table = TableStore::load(&controller.result_path(&key).unwrap().unwrap())
        .await
        .unwrap();
    assert_eq!(table.rows[0]["违规标签"], json!("色情"));
    assert_eq!(table.rows[1]["审核结果"], json!("正常"));
}

#[tokio::test]
async fn test_news_job_counts_skipped_images() {
    let dir = tempfile::tempdir().unwrap();
    let mut server = mockito::Server::new_async().await;

    let mut tiny = std::io::Cursor::new(Vec::new());
    image::RgbImage::new(10, 10)
        .write_to(&mut tiny, image::ImageFormat::Png)
        .unwrap();
    let _tiny = server
        .mock("GET", "/tiny.png")
        .with_status(200)
        .with_body(tiny.into_inner())
        .create_async()
        .await;

    let article = format!(
        "![图]({}/tiny.png)本报讯 市图书馆新馆今日正式开放，首日接待读者超过三千人次。",
        server.url()
    );
    let extract = server
        .mock("POST", "/")
        .match_body(Matcher::Regex("提取以下新闻链接".to_string()))
        .with_status(200)
        .with_body(answer(&article, ""))
        .expect(1)
        .create_async()
        .await;
    let image_audit = server
        .mock("POST", "/")
        .match_body(Matcher::Regex("新闻图片".to_string()))
        .with_status(200)
        .with_body(answer("审核结果：正常", ""))
        .expect(0)
        .create_async()
        .await;
    let text_audit = server
        .mock("POST", "/")
        .match_body(Matcher::Regex("新闻正文".to_string()))
        .with_status(200)
        .with_body(answer("（1）审核结果：正常", ""))
        .expect(1)
        .create_async()
        .await;

    let controller = JobController::new(test_config(dir.path(), server.url(), 0));
    let key = JobKey::new(AuditType::News, "news");
    let dataset = write_dataset(
        dir.path(),
        "news.json",
        json!([{ "新闻链接": "https://news.test/article/1" }]),
    );
    controller.register_dataset(&key, &dataset).await.unwrap();
    controller.start(&key, None).unwrap();

    let snapshot = wait_terminal(&controller, &key).await;
    extract.assert_async().await;
    image_audit.assert_async().await;
    text_audit.assert_async().await;
    assert_eq!(snapshot.status, JobStatus::Done);
    assert_eq!(snapshot.skipped_images, 1);
    assert_eq!(snapshot.statistics.verdict_counts[&Verdict::Normal], 1);
}
