//! Integration tests for draft trees feeding the acceptance step.

use candle_core::{Device, Tensor};
use nano_eagle::{
    AcceptConfig, DraftTree, PathTable, SampleAndAccept, StepInputs, Workspace, INVALID_NODE,
};

fn choices() -> Vec<Vec<usize>> {
    vec![vec![0], vec![1], vec![0, 0], vec![0, 1], vec![0, 0, 0]]
}

#[test]
fn test_choices_to_paths() {
    let tree = DraftTree::from_choices(&choices()).unwrap();
    // [0] -> 1, [1] -> 2, [0,0] -> 3, [0,1] -> 4, [0,0,0] -> 5
    assert_eq!(tree.num_nodes(), 6);
    assert_eq!(tree.max_path_len(), 4);
    assert_eq!(tree.leaves(), vec![2, 4, 5]);

    let paths = tree.to_paths(6, 4).unwrap();
    let table = PathTable::new(&paths, 1, 6, 4).unwrap();
    table.validate().unwrap();

    assert_eq!(table.path(0, 0), &[0, 2, INVALID_NODE, INVALID_NODE]);
    assert_eq!(table.path(0, 1), &[0, 1, 4, INVALID_NODE]);
    assert_eq!(table.path(0, 2), &[0, 1, 3, 5]);
    assert!(!PathTable::is_used(table.path(0, 3)));
}

#[test]
fn test_step_on_choice_tree() {
    let tree = DraftTree::from_choices(&choices()).unwrap();
    let paths = tree.to_paths(6, 4).unwrap();

    // Base-model argmax per node: 10, 11, 12, 13, 14, 15
    let vocab = 16;
    let mut values = vec![0.0f32; 6 * vocab];
    for node in 0..6 {
        values[node * vocab + 10 + node] = 1.0;
    }
    let logits = Tensor::from_vec(values, (6, vocab), &Device::Cpu).unwrap();

    // Draft at node n must equal the target at its parent to be accepted.
    // Accept 1 (parent 0 -> 10), 3 (parent 1 -> 11), reject 5 (parent 3 -> 13).
    let draft_token_ids = [0, 10, 3, 11, 11, 99];
    let inputs = StepInputs {
        logits: &logits,
        draft_token_ids: &draft_token_ids,
        draft_lens: &[5],
        paths: PathTable::new(&paths, 1, 6, 4).unwrap(),
        temperature: &[1.0],
        rand_validation: &[0.0],
    };

    let step = SampleAndAccept::new(AcceptConfig::default()).unwrap();
    let mut workspace = Workspace::new(step.workspace_size(&inputs.shape().unwrap()));
    let outputs = step.step(&inputs, &mut workspace).unwrap();

    // Paths 1 (0-1-4) and 2 (0-1-3-5) both match two draft tokens; path 1 wins.
    assert_eq!(outputs.num_accepted_tokens, vec![3]);
    assert_eq!(outputs.accepted_path_ids, vec![1]);
    assert_eq!(outputs.accepted(0), &[10, 11, 14]);
    assert_eq!(outputs.last_accepted_hidden_indices, vec![4]);
}
