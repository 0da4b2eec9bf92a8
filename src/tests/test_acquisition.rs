use ndarray::array;

use crate::acquisition::{
    Acquisition, AcquisitionParams, ExpectedImprovement, InformationGain, MaxBelief,
    MaxValueEntropySearch, NaiveHotspot, NaiveHotspotValue, RewardMode, UpperConfidenceBound,
};
use crate::gp::OnlineGp;
use crate::kernel::RbfKernel;

fn fitted_model() -> OnlineGp {
    let mut gp = OnlineGp::new(RbfKernel::new(1.0, 4.0, 0.1).unwrap());
    gp.add_data(array![[0.0, 0.0], [1.0, 0.0]].view(), array![2.0, 1.0].view()).unwrap();
    gp
}

fn belief() -> MaxBelief {
    MaxBelief {
        max_values: vec![3.0, 3.5],
        max_locations: vec![[0.0, 0.0], [5.0, 5.0]],
        target: Some([5.0, 5.0]),
    }
}

#[test]
fn test_ucb_rewards_uncertainty() {
    let gp = fitted_model();
    let ucb = UpperConfidenceBound::default();
    let known = array![[0.0, 0.0]];
    let unknown = array![[8.0, 8.0]];
    // far away the mean is ~0 but the bonus dominates
    let far = ucb.score(0, unknown.view(), &gp, &AcquisitionParams::None).unwrap();
    let (mean, _) = gp.predict(known.view(), false).unwrap();
    assert!(far > mean[0]);
}

#[test]
fn test_information_gain_properties() {
    let gp = fitted_model();
    let ig = InformationGain;
    let observed = array![[0.0, 0.0]];
    let fresh = array![[6.0, 6.0]];
    let a = ig.score(0, observed.view(), &gp, &AcquisitionParams::None).unwrap();
    let b = ig.score(0, fresh.view(), &gp, &AcquisitionParams::None).unwrap();
    assert!(a >= 0.0);
    assert!(b > a);

    // a longer path never carries less information
    let path = array![[6.0, 6.0], [7.0, 6.0]];
    let c = ig.score(0, path.view(), &gp, &AcquisitionParams::None).unwrap();
    assert!(c > b);
}

#[test]
fn test_expected_improvement_needs_running_best() {
    let gp = fitted_model();
    let ei = ExpectedImprovement;
    let points = array![[0.0, 0.0], [4.0, 4.0]];
    assert!(ei.score(0, points.view(), &gp, &AcquisitionParams::None).is_err());

    let low = ei.score(0, points.view(), &gp, &AcquisitionParams::RunningBest(vec![0.0])).unwrap();
    let high = ei.score(0, points.view(), &gp, &AcquisitionParams::RunningBest(vec![10.0])).unwrap();
    assert!(low > high);
    assert!(high >= 0.0);
}

#[test]
fn test_mes_prefers_uncertain_points() {
    let gp = fitted_model();
    let mes = MaxValueEntropySearch;
    let params = AcquisitionParams::MaxBelief(belief());
    let near = mes.score(0, array![[0.0, 0.0]].view(), &gp, &params).unwrap();
    let far = mes.score(0, array![[5.0, 5.0]].view(), &gp, &params).unwrap();
    assert!(near.is_finite() && far.is_finite());
    assert!(far > near);
    assert!(mes.score(0, array![[0.0, 0.0]].view(), &gp, &AcquisitionParams::None).is_err());
}

#[test]
fn test_hotspot_heuristics() {
    let gp = fitted_model();
    let params = AcquisitionParams::Heuristic { belief: belief(), radius: 1.5 };
    let points = array![[0.5, 0.0], [1.0, 1.0], [4.0, 4.5], [-3.0, -3.0]];

    let count = NaiveHotspot.score(0, points.view(), &gp, &params).unwrap();
    assert_eq!(count, 3.0);

    let value = NaiveHotspotValue.score(0, points.view(), &gp, &params).unwrap();
    let (mean, _) = gp.predict(points.view(), false).unwrap();
    assert!((value - (mean[0] + mean[1] + mean[2])).abs() < 1e-12);
}

#[test]
fn test_reward_mode_dispatch() {
    let gp = fitted_model();
    let points = array![[0.5, 0.5]];
    let b = belief();
    for mode in [
        RewardMode::Mean,
        RewardMode::InfoGain,
        RewardMode::ExpImprove,
        RewardMode::Mes,
        RewardMode::naive(),
        RewardMode::naive_value(),
    ] {
        let acquisition = mode.acquisition();
        assert_eq!(acquisition.name(), mode.to_string());
        let params = mode.params(Some(&b), &[1.0]).unwrap();
        let score = acquisition.score(3, points.view(), &gp, &params).unwrap();
        assert!(score.is_finite(), "{} produced {}", mode, score);
    }
}
