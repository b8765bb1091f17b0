//! Problem tree processor.
//!
//! A [`CapaProblem`] owns one parsed problem document together with the
//! per-student state persisted between requests: the seed, the submitted
//! answers, the correctness map and the done flag. Construction runs the
//! problem scripts for the seed, assigns identities to every response and
//! input, and applies the seeded shuffle and answer-pool transforms. After
//! that the document is only read: rendering is a pure function of the tree
//! and the persisted state.

use std::collections::BTreeMap;
use std::fmt::Write as _;

use chrono::{DateTime, Utc};
use rand::Rng;
use regex::Regex;
use serde::Serialize;
use tracing::{debug, error, info, warn};
use uuid::Uuid;

use crate::context::EvalContext;
use crate::correctmap::{CorrectMap, CorrectMapEntry, Correctness};
use crate::error::CapaError;
use crate::inputs::{extract_choices, render_input, InputKind, InputState, ResponseData, HINT_TAGS};
use crate::model::{ProblemState, RerandomizePolicy, StudentAnswer, StudentAnswers};
use crate::responses::{ExpectedAnswer, GradeContext, Response, ResponseTag};
use crate::shuffle::rng_for_seed;
use crate::traits::CapaSystem;
use crate::xml::{escape_attr, escape_text, write_open_tag, Document, NodeId, NodeKind};

/// Elements removed from rendered output together with their subtree.
const HIDDEN_TAGS: &[&str] = &[
    "additional_answer",
    "codeparam",
    "responseparam",
    "answer",
    "script",
    "hintgroup",
    "openendedparam",
    "openendedrubric",
];

/// Authoring tags rendered as plain containers without their attributes.
const HTML_TRANSFORMS: &[(&str, &str)] = &[("problem", "div"), ("text", "span"), ("math", "span")];

/// HTML elements written without a closing tag when empty.
const VOID_ELEMENTS: &[&str] = &["br", "hr", "img", "input", "meta", "link", "col", "area"];

/// Upper bound (exclusive) for freshly drawn seeds.
const SEED_BINS: u32 = 1000;

const ANSWER_TEXT_MISSING: &str = "Answer Text Missing";

/// Points awarded against the maximum.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct Score {
    pub score: f64,
    pub total: f64,
}

// ---------------------------------------------------------------------------
// Builder
// ---------------------------------------------------------------------------

/// Configures and constructs a [`CapaProblem`].
pub struct ProblemBuilder {
    source: String,
    problem_id: String,
    system: CapaSystem,
    seed: Option<u32>,
    state: Option<ProblemState>,
    rerandomize: RerandomizePolicy,
}

impl ProblemBuilder {
    /// Use `seed` unless restored state carries one.
    pub fn with_seed(mut self, seed: u32) -> Self {
        self.seed = Some(seed);
        self
    }

    /// Restore persisted state.
    pub fn with_state(mut self, state: ProblemState) -> Self {
        self.state = Some(state);
        self
    }

    pub fn with_rerandomize(mut self, policy: RerandomizePolicy) -> Self {
        self.rerandomize = policy;
        self
    }

    /// Parse the source and build the problem.
    ///
    /// The seed comes from restored state, then an explicit seed, then the
    /// student id under `per_student`, and is drawn at random otherwise.
    pub fn build(self) -> Result<CapaProblem, CapaError> {
        let seed = match (&self.state, self.seed) {
            (Some(state), _) => state.seed,
            (None, Some(seed)) => seed,
            (None, None) if self.rerandomize == RerandomizePolicy::PerStudent => {
                student_seed(&self.system.anonymous_student_id)
            }
            (None, None) => draw_seed(),
        };
        let state = self.state.unwrap_or_default();

        let source = rewrite_text_markers(&self.source)?;
        let tree = ProblemTree::build(&source, &self.problem_id, &self.system, seed)?;

        let mut problem = CapaProblem {
            problem_id: self.problem_id,
            system: self.system,
            rerandomize: self.rerandomize,
            source,
            tree,
            seed,
            student_answers: state.student_answers,
            correct_map: state.correct_map,
            done: state.done,
        };
        if problem.student_answers.is_empty() {
            problem.set_initial_display();
        }
        info!(
            problem = %problem.problem_id,
            seed,
            responses = problem.tree.responses.len(),
            "problem loaded"
        );
        Ok(problem)
    }
}

/// Fresh seed for a new attempt.
fn draw_seed() -> u32 {
    rand::thread_rng().gen_range(0..SEED_BINS)
}

/// Stable seed for `student`, used by the per-student policy.
fn student_seed(student: &str) -> u32 {
    let digest = Uuid::new_v5(&Uuid::NAMESPACE_OID, student.as_bytes());
    let bytes = digest.as_bytes();
    u32::from_be_bytes([bytes[0], bytes[1], bytes[2], bytes[3]]) % SEED_BINS
}

/// Turn legacy `startouttext/` and `endouttext/` markers into `<text>` tags.
fn rewrite_text_markers(source: &str) -> Result<String, CapaError> {
    let start = Regex::new(r"startouttext\s*/").map_err(|e| CapaError::Parse(e.to_string()))?;
    let end = Regex::new(r"endouttext\s*/").map_err(|e| CapaError::Parse(e.to_string()))?;
    let text = start.replace_all(source, "text");
    Ok(end.replace_all(&text, "/text").into_owned())
}

// ---------------------------------------------------------------------------
// Document processing
// ---------------------------------------------------------------------------

/// Everything derived from the source for one seed.
#[derive(Debug, Clone)]
struct ProblemTree {
    doc: Document,
    context: EvalContext,
    /// Responses in document order.
    responses: Vec<Response>,
    /// Accessibility data keyed by answer id.
    problem_data: BTreeMap<String, ResponseData>,
    solutions: Vec<NodeId>,
}

impl ProblemTree {
    fn build(source: &str, problem_id: &str, system: &CapaSystem, seed: u32) -> Result<Self, CapaError> {
        let mut doc = Document::parse(source)?;
        make_xml_compatible(&mut doc)?;
        let context = extract_context(&doc, system, seed)?;

        let root = doc.root();
        let response_nodes: Vec<NodeId> = doc
            .descendants(root)
            .into_iter()
            .filter(|n| doc.tag(*n).is_some_and(ResponseTag::is_response_tag))
            .collect();

        let mut responses = Vec::with_capacity(response_nodes.len());
        let mut problem_data = BTreeMap::new();
        let mut response_index = 1;
        for node in response_nodes {
            let response_id = format!("{problem_id}_{response_index}");
            doc.set_attr(node, "id", &response_id);
            response_index += 1;

            let inputs: Vec<(NodeId, InputKind)> = doc
                .descendants(node)
                .into_iter()
                .filter_map(|d| doc.tag(d).and_then(InputKind::from_tag).map(|k| (d, k)))
                .collect();
            for (entry_index, (input, _)) in inputs.iter().enumerate() {
                let answer_id = format!("{problem_id}_{response_index}_{}", entry_index + 1);
                debug!(response = %response_id, answer = %answer_id, "assigned answer id");
                doc.set_attr(*input, "id", &answer_id);
            }

            let group = response_a11y_data(&mut doc, node, &inputs, &response_id, &mut problem_data);
            let mut response = Response::build(&mut doc, node, &context)?;
            if let Some((label_id, description_ids)) = group {
                response.group_label_id = label_id;
                response.group_description_ids = description_ids;
            }
            responses.push(response);
        }

        let solutions = doc.find_descendants(root, "solution");
        for (k, solution) in solutions.iter().enumerate() {
            doc.set_attr(*solution, "id", &format!("{problem_id}_solution_{}", k + 1));
        }

        let mut rng = rng_for_seed(u64::from(seed));
        for response in &mut responses {
            response.late_transforms(&mut doc, &mut rng)?;
        }

        Ok(Self {
            doc,
            context,
            responses,
            problem_data,
            solutions,
        })
    }

    fn find_by_id(&self, id: &str) -> Option<NodeId> {
        let root = self.doc.root();
        self.doc
            .descendants(root)
            .into_iter()
            .find(|n| self.doc.attr(*n, "id") == Some(id))
    }
}

/// Normalise legacy authoring forms in place.
///
/// `<additional_answer>TEXT</additional_answer>` gains `answer="TEXT"`, and an
/// `<optioninput>` with `<option>` children gets synthesised `options` and
/// `correct` attributes.
fn make_xml_compatible(doc: &mut Document) -> Result<(), CapaError> {
    let root = doc.root();
    for additional in doc.find_descendants(root, "additional_answer") {
        let under_string = doc
            .parent(additional)
            .is_some_and(|p| doc.has_tag(p, "stringresponse"));
        if !under_string || doc.attr(additional, "answer").is_some_and(|a| !a.is_empty()) {
            continue;
        }
        let text = doc.leading_text(additional);
        if !text.is_empty() {
            doc.set_attr(additional, "answer", &text);
            doc.set_text(additional, "");
        }
    }

    for optioninput in doc.find_descendants(root, "optioninput") {
        let options = doc.find_children(optioninput, "option");
        let is_correct =
            |o: &NodeId| doc.attr(*o, "correct").is_some_and(|c| c.trim().eq_ignore_ascii_case("true"));
        if options.iter().filter(|o| is_correct(o)).count() > 1 {
            return Err(CapaError::Parse(
                "Dropdown questions can only have one correct answer.".to_string(),
            ));
        }
        if options.is_empty() {
            continue;
        }
        let mut correct = None;
        let mut names = Vec::with_capacity(options.len());
        for option in &options {
            let name = doc.leading_text(*option).trim().to_string();
            if is_correct(option) {
                correct = Some(name.clone());
            }
            names.push(format!("'{name}'"));
        }
        doc.set_attr(optioninput, "options", &format!("({})", names.join(",")));
        if let Some(correct) = correct {
            doc.set_attr(optioninput, "correct", &correct);
        }
    }
    Ok(())
}

/// Run the problem scripts for `seed` and collect the resulting variables.
fn extract_context(doc: &Document, system: &CapaSystem, seed: u32) -> Result<EvalContext, CapaError> {
    let mut context = EvalContext::new(seed, system.anonymous_student_id.clone());
    for script in doc.find_descendants(doc.root(), "script") {
        let skipped = doc
            .attr(script, "type")
            .is_some_and(|t| t.contains("javascript") || t.contains("perl"));
        if !skipped {
            context.push_script(&doc.text_content(script));
        }
    }
    if context.has_scripts() {
        let vars = system
            .sandbox
            .run(context.script_code(), seed, &context.bindings())
            .map_err(|e| {
                error!("error while executing problem script: {e:#}");
                CapaError::Parse(format!("Error while executing script code: {e}"))
            })?;
        context.extend(vars);
    }
    Ok(context)
}

/// Collect labels and descriptions for the inputs of one response.
///
/// Returns the group label id and description ids for multi-input responses.
fn response_a11y_data(
    doc: &mut Document,
    response: NodeId,
    inputs: &[(NodeId, InputKind)],
    response_id: &str,
    problem_data: &mut BTreeMap<String, ResponseData>,
) -> Option<(Option<String>, Vec<String>)> {
    let (first, first_kind) = *inputs.first()?;

    if inputs.len() > 1 {
        let mut group_label = String::new();
        let mut group_label_id = None;
        if let Some(label) = doc.find_child(response, "label") {
            let id = format!("multiinput-group-label-{response_id}");
            doc.set_tag(label, "p");
            doc.set_attr(label, "id", &id);
            doc.set_attr(label, "class", "multi-inputs-group-label");
            group_label = doc.inner_xml(label);
            group_label_id = Some(id);
        }

        let mut description_ids = Vec::new();
        for (index, description) in doc.find_children(response, "description").into_iter().enumerate() {
            let id = format!("multiinput-group-description-{response_id}-{index}");
            doc.set_tag(description, "p");
            doc.set_attr(description, "id", &id);
            doc.set_attr(description, "class", "multi-inputs-group-description question-description");
            description_ids.push(id);
        }

        for (input, _) in inputs {
            let answer_id = doc.attr(*input, "id").unwrap_or_default().to_string();
            problem_data.insert(
                answer_id,
                ResponseData {
                    label: doc.attr(*input, "label").unwrap_or_default().to_string(),
                    descriptions: Vec::new(),
                    group_label: Some(group_label.clone()),
                },
            );
        }
        return Some((group_label_id, description_ids));
    }

    let mut label = String::new();
    let mut consumed = None;
    if let Some(tag) = doc.find_child(response, "label") {
        label = doc.inner_xml(tag);
        consumed = Some(tag);
    } else if let Some(label_attr) = doc.attr(first, "label").map(str::to_string) {
        if let Some(p) = doc
            .previous_element_sibling(response)
            .filter(|p| doc.has_tag(*p, "p"))
        {
            if doc.leading_text(p) == label_attr {
                label = doc.inner_xml(p);
                consumed = Some(p);
            }
        }
    } else if let Some(tag) = doc
        .previous_element_sibling(response)
        .filter(|l| doc.has_tag(*l, "label"))
    {
        label = doc.inner_xml(tag);
        consumed = Some(tag);
    }
    if let Some(node) = consumed.filter(|_| first_kind.is_accessible()) {
        doc.detach(node);
    }

    let mut descriptions = Vec::new();
    for (k, description) in doc.find_children(response, "description").into_iter().enumerate() {
        descriptions.push((
            format!("description_{response_id}_{}", k + 1),
            doc.inner_xml(description),
        ));
        doc.detach(description);
    }

    let answer_id = doc.attr(first, "id").unwrap_or_default().to_string();
    problem_data.insert(
        answer_id,
        ResponseData {
            label: label.trim().to_string(),
            descriptions,
            group_label: None,
        },
    );
    None
}

// ---------------------------------------------------------------------------
// Problem
// ---------------------------------------------------------------------------

/// One problem instance for one student.
#[derive(Debug, Clone)]
pub struct CapaProblem {
    problem_id: String,
    system: CapaSystem,
    rerandomize: RerandomizePolicy,
    /// Source after marker rewriting, kept for rebuilding on a new seed.
    source: String,
    tree: ProblemTree,
    seed: u32,
    student_answers: StudentAnswers,
    correct_map: CorrectMap,
    done: bool,
}

impl CapaProblem {
    /// Start building a problem from its XML source.
    pub fn builder(source: impl Into<String>, problem_id: impl Into<String>, system: CapaSystem) -> ProblemBuilder {
        ProblemBuilder {
            source: source.into(),
            problem_id: problem_id.into(),
            system,
            seed: None,
            state: None,
            rerandomize: RerandomizePolicy::default(),
        }
    }

    pub fn problem_id(&self) -> &str {
        &self.problem_id
    }

    pub fn seed(&self) -> u32 {
        self.seed
    }

    pub fn done(&self) -> bool {
        self.done
    }

    pub fn rerandomize(&self) -> RerandomizePolicy {
        self.rerandomize
    }

    pub fn student_answers(&self) -> &StudentAnswers {
        &self.student_answers
    }

    pub fn correct_map(&self) -> &CorrectMap {
        &self.correct_map
    }

    pub fn context(&self) -> &EvalContext {
        &self.tree.context
    }

    pub fn responses(&self) -> &[Response] {
        &self.tree.responses
    }

    /// Accessibility data for an answer id.
    pub fn response_data(&self, answer_id: &str) -> Option<&ResponseData> {
        self.tree.problem_data.get(answer_id)
    }

    /// The persisted state: seed, answers, correctness map and done flag.
    pub fn get_state(&self) -> ProblemState {
        ProblemState {
            seed: self.seed,
            student_answers: self.student_answers.clone(),
            correct_map: self.correct_map.clone(),
            done: self.done,
        }
    }

    fn set_initial_display(&mut self) {
        self.student_answers = self
            .tree
            .responses
            .iter()
            .flat_map(|r| r.initial_display())
            .map(|(id, text)| (id, StudentAnswer::Text(text)))
            .collect();
    }

    // -----------------------------------------------------------------------
    // Rendering
    // -----------------------------------------------------------------------

    /// Render the problem to HTML.
    ///
    /// Output depends only on the document and the persisted state.
    pub fn render(&self) -> Result<String, CapaError> {
        let mut out = String::new();
        self.render_node(self.tree.doc.root(), &mut out)?;
        Ok(out)
    }

    fn render_node(&self, node: NodeId, out: &mut String) -> Result<(), CapaError> {
        let doc = &self.tree.doc;
        let ctx = &self.tree.context;
        let (tag, attrs) = match doc.kind(node) {
            NodeKind::Text(text) => {
                out.push_str(&ctx.contextualize_text(&escape_text(text)));
                return Ok(());
            }
            NodeKind::Element { tag, attrs } => (tag.as_str(), attrs),
        };

        if tag == "script" && doc.attr(node, "type").is_some_and(|t| t.contains("javascript")) {
            out.push_str(&doc.outer_xml(node));
            return Ok(());
        }
        if HIDDEN_TAGS.contains(&tag) || HINT_TAGS.contains(&tag) {
            return Ok(());
        }

        if let Some(kind) = InputKind::from_tag(tag) {
            let id = doc.attr(node, "id").unwrap_or_default();
            let fallback = ResponseData::default();
            let state = InputState {
                id,
                value: self.student_answers.get(id),
                entry: self.correct_map.get(id),
                response_data: self.tree.problem_data.get(id).unwrap_or(&fallback),
            };
            out.push_str(&render_input(doc, node, kind, &state, ctx, self.system.renderer.as_ref())?);
            return Ok(());
        }

        if let Some(response) = self.tree.responses.iter().find(|r| r.node == node) {
            let mut inner = String::new();
            for child in doc.children(node) {
                self.render_node(*child, &mut inner)?;
            }
            out.push_str(&response.render_wrapper(&inner, self.correct_map.overall_message()));
            return Ok(());
        }

        if tag == "solution" {
            let id = doc.attr(node, "id").unwrap_or_default();
            let _ = write!(
                out,
                "<section class=\"solution-span\"><span id=\"solution_{}\"></span></section>",
                escape_attr(id)
            );
            return Ok(());
        }

        let transformed = HTML_TRANSFORMS.iter().find(|(from, _)| *from == tag).map(|(_, to)| *to);
        let out_tag = transformed.unwrap_or(tag);
        match transformed {
            Some(_) => write_open_tag(out, out_tag, std::iter::empty()),
            None => {
                let values: Vec<(String, String)> = attrs
                    .iter()
                    .map(|(k, v)| (k.clone(), ctx.contextualize_text(v)))
                    .collect();
                write_open_tag(out, out_tag, values.iter().map(|(k, v)| (k.as_str(), v.as_str())));
            }
        }
        let children = doc.children(node);
        if children.is_empty() && VOID_ELEMENTS.contains(&out_tag) {
            return Ok(());
        }
        for child in children {
            self.render_node(*child, out)?;
        }
        let _ = write!(out, "</{out_tag}>");
        Ok(())
    }

    // -----------------------------------------------------------------------
    // Grading
    // -----------------------------------------------------------------------

    /// Grade `answers` against every response in document order.
    ///
    /// A failure local to one response marks its answers incorrect with a
    /// message and grading continues. Any other failure leaves the stored
    /// answers and correctness map untouched.
    pub async fn grade_answers(&mut self, answers: StudentAnswers) -> Result<CorrectMap, CapaError> {
        if self.done && self.rerandomize == RerandomizePolicy::Always {
            return Err(CapaError::InvalidState(
                "problem must be reset before it can be submitted again".to_string(),
            ));
        }

        let new_cmap = self.grade_from(&answers, &self.correct_map).await?;
        self.student_answers = answers;
        self.correct_map = new_cmap;
        self.done = true;
        Ok(self.correct_map.clone())
    }

    /// Grade stored answers again without recording the result.
    pub async fn rescore(&self) -> Result<CorrectMap, CapaError> {
        let external = self
            .tree
            .responses
            .iter()
            .any(|r| r.tag() == ResponseTag::Code);
        if external {
            return Err(CapaError::InvalidState(
                "cannot rescore problems with externally graded responses".to_string(),
            ));
        }
        self.grade_from(&self.student_answers, &self.correct_map).await
    }

    async fn grade_from(&self, answers: &StudentAnswers, old_cmap: &CorrectMap) -> Result<CorrectMap, CapaError> {
        let gctx = GradeContext {
            system: &self.system,
            eval: &self.tree.context,
        };
        let mut new_cmap = CorrectMap::new();
        for response in &self.tree.responses {
            match response.evaluate_answers(&gctx, answers, old_cmap).await {
                Ok(cmap) => new_cmap.update(cmap),
                Err(e) if e.is_response_local() => {
                    if matches!(e, CapaError::GraderConfiguration(_)) {
                        error!(response = %response.id(), "{e:#}");
                    } else {
                        warn!(response = %response.id(), "answer degraded to incorrect: {e:#}");
                    }
                    let msg = escape_text(&e.learner_message());
                    for answer_id in response.answer_ids() {
                        new_cmap.set(
                            answer_id,
                            CorrectMapEntry::graded(Correctness::Incorrect).with_msg(msg.clone()),
                        );
                    }
                }
                Err(e) => {
                    error!(problem = %self.problem_id, response = %response.id(), "grading failed: {e:#}");
                    return Err(e);
                }
            }
        }
        Ok(new_cmap)
    }

    /// Apply an external grader's result delivered for `queuekey`.
    pub fn update_score(&mut self, score_msg: &str, queuekey: &str) -> CorrectMap {
        let mut cmap = self.correct_map.clone();
        for response in &self.tree.responses {
            response.update_score(score_msg, &mut cmap, queuekey);
        }
        self.correct_map = cmap;
        self.correct_map.clone()
    }

    /// `true` while any response awaits an external grader.
    pub fn is_queued(&self) -> bool {
        self.correct_map.any_queued()
    }

    /// Submission time of the earliest outstanding queue request.
    pub fn get_recentmost_queuetime(&self) -> Option<DateTime<Utc>> {
        self.correct_map.earliest_queuetime()
    }

    pub fn get_max_score(&self) -> f64 {
        self.tree.responses.iter().map(Response::max_score).sum()
    }

    /// Points earned in `correct_map`, or in the stored map when `None`.
    pub fn calculate_score(&self, correct_map: Option<&CorrectMap>) -> Score {
        let cmap = correct_map.unwrap_or(&self.correct_map);
        Score {
            score: cmap.answer_ids().map(|id| cmap.npoints(id)).sum(),
            total: self.get_max_score(),
        }
    }

    /// Return the problem to the unsubmitted state.
    ///
    /// A fresh seed is drawn, and the document rebuilt, when the policy
    /// rerandomizes on reset.
    pub fn reset(&mut self) -> Result<(), CapaError> {
        if !self.done {
            return Err(CapaError::InvalidState(
                "problem has not been submitted yet".to_string(),
            ));
        }
        let reseed = self.rerandomize.rerandomizes_on_reset();
        if reseed && self.is_queued() {
            return Err(CapaError::InvalidState(
                "cannot rerandomize while a submission is waiting for the grader".to_string(),
            ));
        }

        if reseed {
            let seed = draw_seed();
            self.tree = ProblemTree::build(&self.source, &self.problem_id, &self.system, seed)?;
            self.seed = seed;
        }
        self.student_answers.clear();
        self.correct_map = CorrectMap::new();
        self.done = false;
        self.set_initial_display();
        info!(problem = %self.problem_id, seed = self.seed, reseed, "problem reset");
        Ok(())
    }

    // -----------------------------------------------------------------------
    // Answers
    // -----------------------------------------------------------------------

    /// Correct answers for every response, plus solution blocks by id.
    pub fn get_question_answers(&self) -> BTreeMap<String, ExpectedAnswer> {
        let mut answers: BTreeMap<String, ExpectedAnswer> = self
            .tree
            .responses
            .iter()
            .flat_map(Response::get_answers)
            .collect();
        for solution in &self.tree.solutions {
            let Some(id) = self.tree.doc.attr(*solution, "id") else {
                continue;
            };
            let html = self.tree.context.contextualize_text(&self.tree.doc.outer_xml(*solution));
            answers.insert(id.to_string(), ExpectedAnswer::Text(html));
        }
        debug!(problem = %self.problem_id, answers = answers.len(), "collected answers");
        answers
    }

    /// Answer ids reported by each response, in document order.
    pub fn get_answer_ids(&self) -> Vec<Vec<String>> {
        self.tree
            .responses
            .iter()
            .map(|r| r.get_answers().into_keys().collect())
            .collect()
    }

    /// Authored correct answer(s) of one input as text.
    pub fn find_correct_answer_text(&self, answer_id: &str) -> Option<String> {
        let doc = &self.tree.doc;
        let node = self.tree.find_by_id(answer_id)?;
        if let Some(answer) = doc.attr(node, "answer") {
            return Some(self.tree.context.contextualize_text(answer));
        }
        if doc.has_tag(node, "optioninput") {
            return doc.attr(node, "correct").map(str::to_string);
        }
        let correct: Vec<String> = doc
            .element_children(node)
            .filter(|c| doc.attr(*c, "correct") == Some("true"))
            .map(|c| doc.leading_text(c).trim().to_string())
            .collect();
        Some(correct.join(", "))
    }

    /// The question text an answer belongs to.
    ///
    /// Uses the authored label, then a `<p>` or `<label>` preceding the
    /// response (skipping descriptions), then "Question N".
    pub fn find_question_label(&self, answer_id: &str) -> String {
        if let Some(label) = self.tree.problem_data.get(answer_id).map(|d| &d.label) {
            if !label.is_empty() {
                return strip_tags(label);
            }
        }

        let default_label = || {
            let number = answer_id
                .rsplit('_')
                .nth(1)
                .and_then(|n| n.parse::<i64>().ok())
                .map(|n| n - 1)
                .unwrap_or_default();
            format!("Question {number}")
        };

        let doc = &self.tree.doc;
        let Some(parent) = self.tree.find_by_id(answer_id).and_then(|n| doc.parent(n)) else {
            return default_label();
        };
        let mut previous = doc.previous_element_sibling(parent);
        while let Some(p) = previous.filter(|p| doc.has_tag(*p, "description")) {
            previous = doc.previous_element_sibling(p);
        }
        match previous {
            Some(p) if doc.has_tag(p, "p") || doc.has_tag(p, "label") => doc.leading_text(p),
            _ => default_label(),
        }
    }

    /// Human-readable form of a stored answer, resolving `choice_N` names.
    pub fn find_answer_text(&self, answer_id: &str, answer: &StudentAnswer) -> String {
        let text = match answer {
            StudentAnswer::List(items) => items
                .iter()
                .map(|item| self.choice_text(answer_id, item))
                .collect::<Vec<_>>()
                .join(", "),
            StudentAnswer::Text(text) => self.choice_text(answer_id, text),
            StudentAnswer::File(file) => file.filename.clone(),
        };
        if text.is_empty() {
            ANSWER_TEXT_MISSING.to_string()
        } else {
            text
        }
    }

    fn choice_text(&self, answer_id: &str, answer: &str) -> String {
        if !answer.starts_with("choice_") {
            return answer.to_string();
        }
        let doc = &self.tree.doc;
        let matches: Vec<NodeId> = self
            .tree
            .find_by_id(answer_id)
            .map(|input| {
                doc.descendants(input)
                    .into_iter()
                    .filter(|n| doc.attr(*n, "name") == Some(answer))
                    .collect()
            })
            .unwrap_or_default();
        match matches.as_slice() {
            [] => {
                warn!(answer_id, choice = answer, "answer text missing");
                ANSWER_TEXT_MISSING.to_string()
            }
            [choice] => doc
                .parent(*choice)
                .map(|group| extract_choices(doc, group, &self.tree.context))
                .and_then(|choices| choices.into_iter().find(|(name, _)| name == answer))
                .map(|(_, html)| strip_tags(&html))
                .unwrap_or_else(|| ANSWER_TEXT_MISSING.to_string()),
            _ => {
                warn!(answer_id, choice = answer, "multiple answers found");
                "Multiple answers found".to_string()
            }
        }
    }
}

/// Drop markup, keeping text content.
fn strip_tags(html: &str) -> String {
    let mut out = String::with_capacity(html.len());
    let mut in_tag = false;
    for c in html.chars() {
        match c {
            '<' => in_tag = true,
            '>' if in_tag => in_tag = false,
            c if !in_tag => out.push(c),
            _ => {}
        }
    }
    out.trim().to_string()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::responses::test_support::{system, CannedSandbox};
    use chrono::TimeZone;
    use serde_json::json;
    use std::sync::Arc;

    const MIXED: &str = r#"<problem>
<p>Intro to $name.</p>
<script type="loncapa/python">name = "circuits"</script>
<p>Pick the resistor.</p>
<multiplechoiceresponse>
  <choicegroup type="MultipleChoice">
    <choice correct="false">Capacitor</choice>
    <choice correct="true">Resistor</choice>
  </choicegroup>
</multiplechoiceresponse>
<numericalresponse answer="4">
  <responseparam type="tolerance" default="0.1"/>
  <label>Two plus two?</label>
  <description>Give a number.</description>
  <formulaequationinput/>
</numericalresponse>
<solution><p>Resistors resist.</p></solution>
</problem>"#;

    fn scripted_system() -> CapaSystem {
        let mut globals = serde_json::Map::new();
        globals.insert("name".into(), json!("circuits"));
        system().with_sandbox(Arc::new(CannedSandbox {
            globals,
            ..Default::default()
        }))
    }

    fn problem(source: &str, seed: u32) -> CapaProblem {
        CapaProblem::builder(source, "p", scripted_system())
            .with_seed(seed)
            .build()
            .unwrap()
    }

    fn answers(pairs: &[(&str, StudentAnswer)]) -> StudentAnswers {
        pairs.iter().map(|(k, v)| (k.to_string(), v.clone())).collect()
    }

    #[test]
    fn identities_follow_document_order() {
        let p = problem(MIXED, 1);
        let ids: Vec<&str> = p.responses().iter().map(Response::id).collect();
        assert_eq!(ids, vec!["p_1", "p_2"]);
        assert_eq!(p.responses()[0].answer_ids(), &["p_2_1".to_string()]);
        assert_eq!(p.responses()[1].answer_ids(), &["p_3_1".to_string()]);
        assert!(p.get_question_answers().contains_key("p_solution_1"));
    }

    #[test]
    fn labels_and_descriptions_are_extracted() {
        let p = problem(MIXED, 1);
        let data = p.response_data("p_3_1").unwrap();
        assert_eq!(data.label, "Two plus two?");
        assert_eq!(data.descriptions, vec![("description_p_2_1".to_string(), "Give a number.".to_string())]);
        assert_eq!(p.find_question_label("p_3_1"), "Two plus two?");
        assert_eq!(p.find_question_label("p_2_1"), "Pick the resistor.");
    }

    #[test]
    fn render_hides_answers_and_substitutes_variables() {
        let p = problem(MIXED, 1);
        let html = p.render().unwrap();
        assert!(html.starts_with("<div>"));
        assert!(html.contains("Intro to circuits."));
        assert!(!html.contains("responseparam"));
        assert!(!html.contains("name = "));
        assert!(!html.contains("Resistors resist."));
        assert!(html.contains(r#"<span id="solution_p_solution_1"></span>"#));
        assert!(html.contains("<choicegroup.html/>"));
        assert_eq!(html, p.render().unwrap());
    }

    #[test]
    fn text_markers_become_text_elements() {
        let source = "<problem><startouttext/>Hello<endouttext/></problem>";
        let html = problem(source, 1).render().unwrap();
        assert_eq!(html, "<div><span>Hello</span></div>");
    }

    #[test]
    fn script_failure_is_a_parse_error() {
        let err = CapaProblem::builder(MIXED, "p", system()).with_seed(1).build().unwrap_err();
        assert!(matches!(err, CapaError::Parse(ref m) if m.starts_with("Error while executing script code")));
    }

    #[test]
    fn dropdown_with_two_correct_options_is_rejected() {
        let source = r#"<problem><optionresponse><optioninput>
            <option correct="True">a</option><option correct="True">b</option>
          </optioninput></optionresponse></problem>"#;
        let err = CapaProblem::builder(source, "p", system()).with_seed(1).build().unwrap_err();
        assert_eq!(
            err.to_string(),
            "problem parse error: Dropdown questions can only have one correct answer."
        );
    }

    #[test]
    fn option_children_synthesise_attributes() {
        let source = r#"<problem><optionresponse><optioninput>
            <option correct="False">up</option><option correct="True">down</option>
          </optioninput></optionresponse></problem>"#;
        let p = CapaProblem::builder(source, "p", system()).with_seed(1).build().unwrap();
        assert_eq!(p.find_correct_answer_text("p_2_1").as_deref(), Some("down"));
    }

    #[tokio::test]
    async fn grading_updates_state_and_score() {
        let mut p = problem(MIXED, 1);
        assert_eq!(p.get_max_score(), 2.0);
        let cmap = p
            .grade_answers(answers(&[
                ("p_2_1", StudentAnswer::from("choice_1")),
                ("p_3_1", StudentAnswer::from("2*2")),
            ]))
            .await
            .unwrap();
        assert_eq!(cmap.correctness("p_2_1"), Some(Correctness::Correct));
        assert_eq!(cmap.correctness("p_3_1"), Some(Correctness::Correct));
        assert!(p.done());
        assert_eq!(p.calculate_score(None), Score { score: 2.0, total: 2.0 });
        assert_eq!(p.find_answer_text("p_2_1", &StudentAnswer::from("choice_1")), "Resistor");
    }

    #[tokio::test]
    async fn student_errors_degrade_one_answer() {
        let mut p = problem(MIXED, 1);
        let cmap = p
            .grade_answers(answers(&[
                ("p_2_1", StudentAnswer::from("choice_1")),
                ("p_3_1", StudentAnswer::from("4 +* ")),
            ]))
            .await
            .unwrap();
        assert_eq!(cmap.correctness("p_2_1"), Some(Correctness::Correct));
        assert_eq!(cmap.correctness("p_3_1"), Some(Correctness::Incorrect));
        assert!(!cmap.msg("p_3_1").is_empty());
    }

    #[tokio::test]
    async fn misconfigured_response_does_not_block_siblings() {
        let source = r#"<problem>
            <multiplechoiceresponse><choicegroup><choice correct="false">a</choice></choicegroup></multiplechoiceresponse>
            <stringresponse answer="x"><textline/></stringresponse>
          </problem>"#;
        let mut p = CapaProblem::builder(source, "p", system()).with_seed(1).build().unwrap();
        let cmap = p
            .grade_answers(answers(&[
                ("p_2_1", StudentAnswer::from("choice_0")),
                ("p_3_1", StudentAnswer::from("x")),
            ]))
            .await
            .unwrap();
        assert_eq!(cmap.correctness("p_2_1"), Some(Correctness::Incorrect));
        assert_eq!(cmap.msg("p_2_1"), crate::error::GENERIC_FAILURE_MESSAGE);
        assert_eq!(cmap.correctness("p_3_1"), Some(Correctness::Correct));
    }

    #[tokio::test]
    async fn custom_response_without_checker_reports_failure() {
        let source = r#"<problem><customresponse><textline/></customresponse></problem>"#;
        let mut p = CapaProblem::builder(source, "p", system()).with_seed(1).build().unwrap();
        let cmap = p.grade_answers(answers(&[("p_2_1", StudentAnswer::from("42"))])).await.unwrap();
        assert_eq!(cmap.correctness("p_2_1"), Some(Correctness::Incorrect));
        assert_eq!(cmap.msg("p_2_1"), crate::error::GENERIC_FAILURE_MESSAGE);
    }

    #[tokio::test]
    async fn reset_rules() {
        let mut p = CapaProblem::builder(MIXED, "p", scripted_system())
            .with_seed(3)
            .with_rerandomize(RerandomizePolicy::Always)
            .build()
            .unwrap();
        assert!(matches!(p.reset(), Err(CapaError::InvalidState(_))));

        p.grade_answers(answers(&[("p_2_1", StudentAnswer::from("choice_0"))]))
            .await
            .unwrap();
        let again = p.grade_answers(StudentAnswers::new()).await;
        assert!(matches!(again, Err(CapaError::InvalidState(_))));

        p.reset().unwrap();
        assert!(!p.done());
        assert!(p.student_answers().is_empty());
        assert!(p.correct_map().is_empty());
    }

    #[test]
    fn rerandomizing_reset_is_refused_while_queued() {
        let mut cmap = CorrectMap::new();
        let time = Utc.with_ymd_and_hms(2024, 3, 1, 12, 0, 0).unwrap();
        cmap.set("p_2_1", CorrectMapEntry::queued("k1".into(), time, "queued"));
        let state = ProblemState {
            seed: 3,
            student_answers: StudentAnswers::new(),
            correct_map: cmap,
            done: true,
        };
        let mut p = CapaProblem::builder(MIXED, "p", scripted_system())
            .with_state(state)
            .with_rerandomize(RerandomizePolicy::OnReset)
            .build()
            .unwrap();
        assert!(p.is_queued());
        assert_eq!(p.get_recentmost_queuetime(), Some(time));
        assert!(matches!(p.reset(), Err(CapaError::InvalidState(_))));
    }

    #[test]
    fn per_student_seed_is_stable() {
        let build = |student: &str| {
            CapaProblem::builder(MIXED, "p", scripted_system().with_student(student))
                .with_rerandomize(RerandomizePolicy::PerStudent)
                .build()
                .unwrap()
                .seed()
        };
        assert_eq!(build("alice"), build("alice"));
        assert!(build("alice") < SEED_BINS);
    }

    #[test]
    fn default_question_label_uses_the_response_number() {
        let source = r#"<problem><stringresponse answer="a"><textline/></stringresponse></problem>"#;
        let p = CapaProblem::builder(source, "p", system()).with_seed(1).build().unwrap();
        assert_eq!(p.find_question_label("p_2_1"), "Question 1");
    }

    #[test]
    fn strip_tags_keeps_text() {
        assert_eq!(strip_tags("<b>Hi</b> there "), "Hi there");
    }
}
